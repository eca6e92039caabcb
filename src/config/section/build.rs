//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! cache = ".viewpack"   # manifests, compiled artifacts and registries
//! jobs = 0              # compile workers (0 = one per core)
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CACHE_DIR;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Cache root, relative to the project root
    pub cache: PathBuf,
    /// Worker threads for compilation
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cache: PathBuf::from(CACHE_DIR),
            jobs: 0,
        }
    }
}

impl BuildConfig {
    pub(crate) fn normalize(&mut self, root: &Path) {
        if self.cache.is_relative() {
            self.cache = root.join(&self.cache);
        }
    }
}
