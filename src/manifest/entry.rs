//! Manifest records.

use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::cache::CacheLayout;
use crate::ident::LogicalId;

/// Output of a successful compile, as persisted in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFile {
    /// Source path the code was compiled from
    pub orig: PathBuf,
    /// Exported component name (registry key)
    pub name: String,
    /// Compiled code path inside the cache directory
    pub file: PathBuf,
}

/// Cache metadata for one logical template or asset.
///
/// Serialized as `{ id, path, mtime, lmtime?, file? }`. Missing optional
/// fields mean "never compiled".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: LogicalId,
    /// Source path last observed for this id
    #[serde(default)]
    pub path: PathBuf,
    /// Source mtime at the latest scan (ms since epoch)
    #[serde(default)]
    pub mtime: u64,
    /// Source mtime at the last successful compile/copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lmtime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<CompiledFile>,
}

impl ManifestEntry {
    pub fn new(id: LogicalId, path: PathBuf, mtime: u64) -> Self {
        Self {
            id,
            path,
            mtime,
            lmtime: None,
            file: None,
        }
    }

    /// Whether this entry needs to go through the executor again.
    ///
    /// Checks the recorded timestamps *and* the cache directory, since the
    /// cache can be wiped independently of the manifest file.
    pub fn is_stale(&self, layout: &CacheLayout, is_template: bool) -> bool {
        if self.lmtime != Some(self.mtime) {
            return true;
        }

        let raw = layout.raw_copy(&self.id, &self.path, is_template);
        if !raw.is_file() {
            return true;
        }

        if !is_template {
            return false;
        }

        match &self.file {
            Some(compiled) => !compiled.file.is_file(),
            None => true,
        }
    }
}

/// Modification time in milliseconds since the Unix epoch.
pub fn mtime_millis(path: &Path) -> io::Result<u64> {
    let modified = path.metadata()?.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    Ok(u64::try_from(millis).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn compiled_entry(layout: &CacheLayout, source: &Path) -> ManifestEntry {
        let id = LogicalId::from("page/home");
        let raw = layout.raw_copy(&id, source, true);
        let code = CacheLayout::compiled_code(&raw);
        fs::create_dir_all(raw.parent().unwrap()).unwrap();
        fs::write(&raw, "<home/>").unwrap();
        fs::write(&code, "export default {}").unwrap();

        ManifestEntry {
            id,
            path: source.to_path_buf(),
            mtime: 10,
            lmtime: Some(10),
            file: Some(CompiledFile {
                orig: source.to_path_buf(),
                name: "home".into(),
                file: code,
            }),
        }
    }

    #[test]
    fn test_fresh_entry() {
        let dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(dir.path(), "views");
        let entry = compiled_entry(&layout, Path::new("/src/views/page/home.riot"));
        assert!(!entry.is_stale(&layout, true));
    }

    #[test]
    fn test_stale_on_mtime_change() {
        let dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(dir.path(), "views");
        let mut entry = compiled_entry(&layout, Path::new("/src/views/page/home.riot"));
        entry.mtime = 11;
        assert!(entry.is_stale(&layout, true));
    }

    #[test]
    fn test_stale_when_cache_wiped() {
        let dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(dir.path(), "views");
        let entry = compiled_entry(&layout, Path::new("/src/views/page/home.riot"));
        fs::remove_dir_all(layout.artifacts_dir()).unwrap();
        assert!(entry.is_stale(&layout, true));
    }

    #[test]
    fn test_stale_when_compiled_output_missing() {
        let dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(dir.path(), "views");
        let entry = compiled_entry(&layout, Path::new("/src/views/page/home.riot"));
        fs::remove_file(&entry.file.as_ref().unwrap().file).unwrap();
        assert!(entry.is_stale(&layout, true));
    }

    #[test]
    fn test_template_without_descriptor_is_stale() {
        let dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(dir.path(), "views");
        let mut entry = compiled_entry(&layout, Path::new("/src/views/page/home.riot"));
        entry.file = None;
        assert!(entry.is_stale(&layout, true));
    }

    #[test]
    fn test_asset_needs_only_raw_copy() {
        let dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(dir.path(), "views");
        let source = Path::new("/src/views/js/base.js");
        let id = LogicalId::from("js/base.js");
        let raw = layout.raw_copy(&id, source, false);
        fs::create_dir_all(raw.parent().unwrap()).unwrap();
        fs::write(&raw, "export {}").unwrap();

        let mut entry = ManifestEntry::new(id, source.to_path_buf(), 5);
        assert!(entry.is_stale(&layout, false));
        entry.lmtime = Some(5);
        assert!(!entry.is_stale(&layout, false));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let entry = ManifestEntry::new(LogicalId::from("a"), PathBuf::from("/v/a.riot"), 1);
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"id":"a","path":"/v/a.riot","mtime":1}"#);
    }

    #[test]
    fn test_mtime_millis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.riot");
        fs::write(&path, "x").unwrap();
        let when = UNIX_EPOCH + std::time::Duration::from_millis(1_700_000_000_123);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(when)
            .unwrap();
        assert_eq!(mtime_millis(&path).unwrap(), 1_700_000_000_123);
    }
}
