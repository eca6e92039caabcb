//! Project configuration management for `viewpack.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [build] [compiler] [registry] [serve] [[target]]
//! ├── error          # ConfigError, ConfigDiagnostics
//! ├── util           # find_config_file
//! └── mod.rs         # Config (this file)
//! ```
//!
//! A missing config file is not an error: every section has defaults and
//! the default target compiles `**/views/**/*` below the working directory.

mod error;
pub mod section;
mod util;

pub use error::{ConfigDiagnostics, ConfigError};
pub use section::{BuildConfig, CompilerConfig, RegistryConfig, ServeConfig, TargetConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::log;
use util::find_config_file;

/// Default config file name
pub const CONFIG_FILE: &str = "viewpack.toml";

/// Root configuration structure representing viewpack.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default = "section::default_targets", rename = "target")]
    pub targets: Vec<TargetConfig>,

    #[serde(default)]
    pub serve: ServeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            root: PathBuf::new(),
            build: BuildConfig::default(),
            compiler: CompilerConfig::default(),
            registry: RegistryConfig::default(),
            targets: section::default_targets(),
            serve: ServeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration, searching upward from cwd for `config_name`.
    ///
    /// The project root is the config file's parent directory, or cwd when
    /// no config file exists.
    pub fn load(config_name: &Path) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let (mut config, config_path) = match find_config_file(config_name, &cwd) {
            Some(path) => (Self::from_path(&path)?, path),
            None => {
                crate::debug!("config"; "no {} found, using defaults", config_name.display());
                (Self::default(), cwd.join(config_name))
            }
        };

        let root = config_path
            .parent()
            .map_or_else(|| cwd.clone(), Path::to_path_buf);
        config.finalize(&root, config_path);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {field}");
        }
    }

    /// Resolve root-relative paths.
    fn finalize(&mut self, root: &Path, config_path: PathBuf) {
        let root = crate::utils::path::normalize_path(root);
        self.build.normalize(&root);
        self.config_path = config_path;
        self.root = root;
    }

    /// Validate every section, collecting all errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        self.compiler.validate(&mut diag);
        self.registry.validate(&mut diag);
        section::validate_targets(&self.targets, &mut diag);
        diag.into_result()
    }

    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Look up a target by name.
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Absolute cache root.
    pub fn cache_dir(&self) -> &Path {
        &self.build.cache
    }
}

/// Parse config and panic on unknown fields (to catch typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> Config {
    let (parsed, ignored) = Config::parse_with_ignored(content).unwrap();
    assert!(ignored.is_empty(), "test config has unknown fields: {ignored:?}");
    parsed
}
