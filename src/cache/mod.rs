//! Cache directory layout and write helpers.
//!
//! ```text
//! .viewpack/
//! ├── views.json              # manifest
//! ├── views.backend.js        # server registry
//! ├── views.frontend.js       # client registry
//! └── views/
//!     ├── js/base.js          # mirrored asset
//!     ├── page/home.riot      # raw template copy
//!     ├── page/home.riot.js   # compiled code
//!     └── page/home.riot.js.map
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ident::LogicalId;

/// Default cache root (relative to the project root)
pub const CACHE_DIR: &str = ".viewpack";

/// Cache directory I/O failure. Always fatal for a run.
#[derive(Debug, Error)]
#[error("cache I/O error at `{}`", path.display())]
pub struct CacheError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl CacheError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Paths owned by one target inside the cache root.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
    target: String,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            target: target.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding raw copies and compiled artifacts.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(&self.target)
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.root.join(format!("{}.json", self.target))
    }

    pub fn backend_registry(&self) -> PathBuf {
        self.root.join(format!("{}.backend.js", self.target))
    }

    pub fn frontend_registry(&self) -> PathBuf {
        self.root.join(format!("{}.frontend.js", self.target))
    }

    /// Raw copy location. Templates get their source extension back so
    /// `page/home` from `home.riot` lands at `page/home.riot`.
    pub fn raw_copy(&self, id: &LogicalId, source: &Path, is_template: bool) -> PathBuf {
        let mut path = self.artifacts_dir().join(id.to_relative_path());
        if is_template && let Some(ext) = source.extension() {
            let mut name = path.file_name().unwrap_or_default().to_os_string();
            name.push(".");
            name.push(ext);
            path.set_file_name(name);
        }
        path
    }

    /// Compiled code location for a raw copy.
    pub fn compiled_code(raw_copy: &Path) -> PathBuf {
        append_ext(raw_copy, "js")
    }

    /// Source map location for a raw copy.
    pub fn source_map(raw_copy: &Path) -> PathBuf {
        append_ext(raw_copy, "js.map")
    }

    /// Create the artifacts directory.
    pub fn ensure(&self) -> Result<(), CacheError> {
        let dir = self.artifacts_dir();
        fs::create_dir_all(&dir).map_err(|e| CacheError::new(dir, e))
    }
}

fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Check if file content is the same as new content
pub fn file_content_matches(path: &Path, content: &str) -> bool {
    path.exists() && fs::read_to_string(path).is_ok_and(|existing| existing == content)
}

/// Write `content` unless the file already holds exactly that.
///
/// Returns `true` when the file was written.
pub fn write_if_changed(path: &Path, content: &str) -> Result<bool, CacheError> {
    if file_content_matches(path, content) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CacheError::new(parent, e))?;
    }
    fs::write(path, content).map_err(|e| CacheError::new(path, e))?;
    Ok(true)
}

/// Write via a sibling temp file and rename, so readers never see a
/// half-written file.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CacheError::new(parent, e))?;
    }
    let temp = append_ext(path, "tmp");
    fs::write(&temp, content).map_err(|e| CacheError::new(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| CacheError::new(path, e))
}

/// Remove a file if it exists.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove the whole cache root.
pub fn clear_cache_dir(root: &Path) -> io::Result<bool> {
    if root.exists() {
        fs::remove_dir_all(root)?;
        return Ok(true);
    }
    Ok(false)
}
