//! Persisted staleness manifest.
//!
//! One [`ManifestEntry`] per [`LogicalId`], stored as a JSON object keyed by
//! id. The orchestrator is the only writer: it loads the manifest, reconciles
//! it against the discovered files, applies executor results after the
//! worker join, and persists it as the very last step of a run.

mod entry;

pub use entry::{CompiledFile, ManifestEntry, mtime_millis};

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

use crate::cache::{self, CacheError, CacheLayout};
use crate::ident::{LogicalId, NormalizeError, Normalizer};

/// Manifest persistence failure.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to serialize manifest")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Write(#[from] CacheError),
}

/// Result of merging a discovery pass into the manifest.
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Entries removed because their file was not discovered (or is gone)
    pub pruned: Vec<ManifestEntry>,
    /// Ids that more than one discovered path mapped to: (id, dropped, kept)
    pub collisions: Vec<(LogicalId, PathBuf, PathBuf)>,
}

#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    entries: BTreeMap<LogicalId, ManifestEntry>,
}

impl Manifest {
    /// Empty manifest that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the manifest at `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty manifest, which
    /// forces a full rebuild instead of failing the run.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut manifest = Self::empty(&path);

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) => {
                if path.exists() {
                    crate::log!("manifest"; "unreadable {}: {}, rebuilding", path.display(), e);
                }
                return manifest;
            }
        };

        let records: BTreeMap<String, ManifestEntry> = match serde_json::from_str(&json) {
            Ok(records) => records,
            Err(e) => {
                crate::log!("manifest"; "corrupt {}: {}, rebuilding", path.display(), e);
                return manifest;
            }
        };

        // Records without a source path cannot be reconciled
        manifest.entries = records
            .into_values()
            .filter(|entry| !entry.path.as_os_str().is_empty())
            .map(|entry| (entry.id.clone(), entry))
            .collect();

        crate::debug!("manifest"; "loaded {} entries from {}", manifest.len(), path.display());
        manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &LogicalId) -> Option<&ManifestEntry> {
        self.entries.get(id)
    }

    /// All entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Entries with a compiled descriptor, in id order.
    pub fn compiled(&self) -> impl Iterator<Item = (&ManifestEntry, &CompiledFile)> {
        self.entries
            .values()
            .filter_map(|entry| entry.file.as_ref().map(|file| (entry, file)))
    }

    /// Merge discovered files into the manifest.
    ///
    /// Every path is normalized before anything is mutated, so a
    /// normalization error leaves the manifest exactly as loaded. Files that
    /// vanish before they can be stat'ed are treated as deleted.
    pub fn reconcile(
        &mut self,
        files: &[PathBuf],
        normalizer: &Normalizer,
    ) -> Result<Reconciled, NormalizeError> {
        let ids = files
            .iter()
            .map(|path| normalizer.normalize(path).map(|id| (id, path)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Reconciled::default();
        let mut seen: BTreeMap<LogicalId, (&PathBuf, u64)> = BTreeMap::new();

        for (id, path) in ids {
            let mtime = match mtime_millis(path) {
                Ok(mtime) => mtime,
                Err(e) => {
                    crate::debug!("manifest"; "skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            // Last path wins
            if let Some((previous, _)) = seen.insert(id.clone(), (path, mtime)) {
                result.collisions.push((id, previous.clone(), path.clone()));
            }
        }

        for (id, &(path, mtime)) in &seen {
            match self.entries.get_mut(id) {
                Some(entry) => {
                    if entry.path != *path {
                        // The cached artifacts belong to the old file
                        entry.path.clone_from(path);
                        entry.lmtime = None;
                    }
                    entry.mtime = mtime;
                }
                None => {
                    self.entries
                        .insert(id.clone(), ManifestEntry::new(id.clone(), path.clone(), mtime));
                }
            }
        }

        let removed: Vec<LogicalId> = self
            .entries
            .keys()
            .filter(|id| !seen.contains_key(*id))
            .cloned()
            .collect();

        for id in removed {
            if let Some(entry) = self.entries.remove(&id) {
                result.pruned.push(entry);
            }
        }

        Ok(result)
    }

    /// Whether `id` must be compiled (or copied) this run. Unknown ids are stale.
    pub fn is_stale(&self, id: &LogicalId, layout: &CacheLayout, normalizer: &Normalizer) -> bool {
        self.get(id)
            .is_none_or(|entry| entry.is_stale(layout, normalizer.is_template(&entry.path)))
    }

    /// Record a successful compile. Only called after the outputs are on disk.
    pub fn mark_compiled(&mut self, id: &LogicalId, compiled: CompiledFile) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.file = Some(compiled);
            entry.lmtime = Some(entry.mtime);
        }
    }

    /// Record that a plain asset was mirrored into the cache.
    pub fn mark_observed(&mut self, id: &LogicalId) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.lmtime = Some(entry.mtime);
        }
    }

    /// Serialize the manifest.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let records: BTreeMap<&str, &ManifestEntry> = self
            .entries
            .iter()
            .map(|(id, entry)| (id.as_str(), entry))
            .collect();
        serde_json::to_string_pretty(&records)
    }

    /// Write the manifest back to disk (atomically, skipped when unchanged).
    ///
    /// Returns `true` when the file was rewritten.
    pub fn persist(&self) -> Result<bool, ManifestError> {
        let json = self.to_json()?;
        if cache::file_content_matches(&self.path, &json) {
            crate::debug!("manifest"; "unchanged, skipping write");
            return Ok(false);
        }
        cache::write_atomic(&self.path, &json)?;
        crate::debug!("manifest"; "saved {} entries to {}", self.len(), self.path.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn normalizer() -> Normalizer {
        Normalizer::new("views", &["riot".to_string()])
    }

    fn write_with_mtime(path: &Path, content: &str, millis: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_millis(millis))
            .unwrap();
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::load(dir.path().join("views.json"));
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("views.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Manifest::load(&path).is_empty());
    }

    #[test]
    fn test_load_drops_records_without_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("views.json");
        fs::write(
            &path,
            r#"{"a":{"id":"a","path":"/v/a.riot","mtime":1},"b":{"id":"b"}}"#,
        )
        .unwrap();
        let manifest = Manifest::load(&path);
        assert_eq!(manifest.len(), 1);
        assert!(manifest.get(&LogicalId::from("a")).is_some());
    }

    #[test]
    fn test_load_ignores_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("views.json");
        fs::write(
            &path,
            r#"{"a":{"id":"a","path":"/v/a.riot","mtime":3,"lmtime":3,"code":"x","map":{}}}"#,
        )
        .unwrap();
        let manifest = Manifest::load(&path);
        assert_eq!(manifest.get(&LogicalId::from("a")).unwrap().lmtime, Some(3));
    }

    #[test]
    fn test_reconcile_upserts_and_prunes() {
        let dir = TempDir::new().unwrap();
        let views = dir.path().join("app/views");
        let a = views.join("a.riot");
        let b = views.join("b.riot");
        write_with_mtime(&a, "a", 1_000);
        write_with_mtime(&b, "b", 2_000);

        let mut manifest = Manifest::empty(dir.path().join("views.json"));
        let result = manifest.reconcile(&[a.clone(), b.clone()], &normalizer()).unwrap();
        assert!(result.pruned.is_empty());
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get(&LogicalId::from("b")).unwrap().mtime, 2_000);

        write_with_mtime(&a, "a2", 3_000);
        let result = manifest.reconcile(&[a], &normalizer()).unwrap();
        assert_eq!(result.pruned.len(), 1);
        assert_eq!(result.pruned[0].id.as_str(), "b");
        assert_eq!(manifest.get(&LogicalId::from("a")).unwrap().mtime, 3_000);
    }

    #[test]
    fn test_reconcile_moves_path_in_place() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("one/views/a.riot");
        let new = dir.path().join("two/views/a.riot");
        write_with_mtime(&old, "a", 1_000);
        write_with_mtime(&new, "a", 1_000);

        let mut manifest = Manifest::empty(dir.path().join("views.json"));
        manifest.reconcile(&[old], &normalizer()).unwrap();
        manifest.mark_observed(&LogicalId::from("a"));

        manifest.reconcile(&[new.clone()], &normalizer()).unwrap();
        let entry = manifest.get(&LogicalId::from("a")).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(entry.path, new);
        assert_eq!(entry.lmtime, None);
    }

    #[test]
    fn test_reconcile_moved_file_is_stale_even_with_same_mtime() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("one/views/a.riot");
        let new = dir.path().join("two/views/a.riot");
        write_with_mtime(&old, "old", 1_000);
        write_with_mtime(&new, "new", 1_000);
        let layout = CacheLayout::new(dir.path().join("cache"), "views");
        let id = LogicalId::from("a");

        let mut manifest = Manifest::empty(layout.manifest_file());
        manifest.reconcile(&[old], &normalizer()).unwrap();
        let raw = layout.raw_copy(&id, &new, true);
        fs::create_dir_all(raw.parent().unwrap()).unwrap();
        fs::write(&raw, "old").unwrap();
        fs::write(CacheLayout::compiled_code(&raw), "old").unwrap();
        manifest.mark_compiled(
            &id,
            CompiledFile {
                orig: dir.path().join("one/views/a.riot"),
                name: "a".into(),
                file: CacheLayout::compiled_code(&raw),
            },
        );
        assert!(!manifest.is_stale(&id, &layout, &normalizer()));

        manifest.reconcile(&[new], &normalizer()).unwrap();
        assert!(manifest.is_stale(&id, &layout, &normalizer()));
    }

    #[test]
    fn test_reconcile_stable_collision_keeps_lmtime() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("one/views/a.riot");
        let second = dir.path().join("two/views/a.riot");
        write_with_mtime(&first, "a", 1_000);
        write_with_mtime(&second, "a", 2_000);
        let files = [first, second.clone()];

        let mut manifest = Manifest::empty(dir.path().join("views.json"));
        manifest.reconcile(&files, &normalizer()).unwrap();
        manifest.mark_observed(&LogicalId::from("a"));

        let result = manifest.reconcile(&files, &normalizer()).unwrap();
        assert_eq!(result.collisions.len(), 1);
        let entry = manifest.get(&LogicalId::from("a")).unwrap();
        assert_eq!(entry.path, second);
        assert_eq!(entry.lmtime, Some(2_000));
    }

    #[test]
    fn test_reconcile_reports_collisions() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("one/views/a.riot");
        let second = dir.path().join("two/views/a.riot");
        write_with_mtime(&first, "a", 1_000);
        write_with_mtime(&second, "a", 1_000);

        let mut manifest = Manifest::empty(dir.path().join("views.json"));
        let result = manifest
            .reconcile(&[first.clone(), second.clone()], &normalizer())
            .unwrap();
        assert_eq!(result.collisions, vec![(LogicalId::from("a"), first, second.clone())]);
        assert_eq!(manifest.get(&LogicalId::from("a")).unwrap().path, second);
    }

    #[test]
    fn test_reconcile_error_leaves_manifest_untouched() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("views/a.riot");
        let bad = dir.path().join("elsewhere/b.riot");
        write_with_mtime(&good, "a", 1_000);
        write_with_mtime(&bad, "b", 1_000);

        let mut manifest = Manifest::empty(dir.path().join("views.json"));
        manifest.reconcile(&[good.clone()], &normalizer()).unwrap();

        let err = manifest.reconcile(&[bad], &normalizer()).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingBoundary { .. }));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_reconcile_skips_vanished_files() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("views/gone.riot");
        let mut manifest = Manifest::empty(dir.path().join("views.json"));
        let result = manifest.reconcile(&[gone], &normalizer()).unwrap();
        assert!(manifest.is_empty());
        assert!(result.pruned.is_empty());
    }

    #[test]
    fn test_mark_compiled_sets_lmtime() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("views/a.riot");
        write_with_mtime(&a, "a", 7_000);

        let mut manifest = Manifest::empty(dir.path().join("views.json"));
        manifest.reconcile(&[a.clone()], &normalizer()).unwrap();
        let id = LogicalId::from("a");
        manifest.mark_compiled(
            &id,
            CompiledFile {
                orig: a,
                name: "a".into(),
                file: dir.path().join("a.riot.js"),
            },
        );
        let entry = manifest.get(&id).unwrap();
        assert_eq!(entry.lmtime, Some(7_000));
        assert_eq!(entry.file.as_ref().unwrap().name, "a");
    }

    #[test]
    fn test_unknown_id_is_stale() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::empty(dir.path().join("views.json"));
        let layout = CacheLayout::new(dir.path(), "views");
        assert!(manifest.is_stale(&LogicalId::from("nope"), &layout, &normalizer()));
    }

    #[test]
    fn test_persist_roundtrip_and_skip() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("views/a.riot");
        write_with_mtime(&a, "a", 1_000);

        let path = dir.path().join("cache/views.json");
        let mut manifest = Manifest::empty(&path);
        manifest.reconcile(&[a], &normalizer()).unwrap();
        assert!(manifest.persist().unwrap());
        assert!(!manifest.persist().unwrap());

        let reloaded = Manifest::load(&path);
        assert_eq!(reloaded.to_json().unwrap(), manifest.to_json().unwrap());
    }
}
