//! `viewpack clean`: drop the cache root.

use anyhow::{Context, Result};

use crate::cache::clear_cache_dir;
use crate::config::Config;
use crate::log;

pub fn clean(config: &Config) -> Result<()> {
    let cache = config.cache_dir();
    let removed = clear_cache_dir(cache)
        .with_context(|| format!("failed to remove {}", cache.display()))?;

    if removed {
        log!("clean"; "removed {}", cache.display());
    } else {
        log!("clean"; "nothing to clean");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_clean_removes_cache() {
        let dir = TempDir::new().unwrap();
        let mut config = test_parse_config("[build]\ncache = \".viewpack\"");
        config.build.cache = dir.path().join(".viewpack");
        fs::create_dir_all(config.cache_dir().join("views")).unwrap();
        fs::write(config.cache_dir().join("views.json"), "{}").unwrap();

        clean(&config).unwrap();
        assert!(!config.cache_dir().exists());

        // Second run is a no-op
        clean(&config).unwrap();
    }
}
