//! Path normalization utilities.
//!
//! - `normalize_path` - file system paths (canonicalize + fallback)
//! - `to_slash` - `/`-separated display form used in ids, globs and generated code

use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Return as-is if already absolute
/// - Join with current directory if relative
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Path as a string with `/` separators on every platform.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_relative_becomes_absolute() {
        let path = normalize_path(Path::new("definitely/not/here"));
        assert!(path.is_absolute());
        assert!(path.ends_with("definitely/not/here"));
    }

    #[test]
    fn test_to_slash() {
        assert_eq!(to_slash(Path::new(r"views\page\home.riot")), "views/page/home.riot");
        assert_eq!(to_slash(Path::new("views/page")), "views/page");
    }
}
