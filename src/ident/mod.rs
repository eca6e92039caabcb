//! Logical template identifiers.
//!
//! A [`LogicalId`] is the part of a source path after the configured boundary
//! segment, joined with `/` and with the template extension stripped:
//!
//! ```text
//! /srv/app/bundles/shop/views/page/home.riot  -> page/home
//! C:\app\bundles\shop\views\js\base.js       -> js/base.js
//! ```
//!
//! Ids are the manifest primary key, so normalization never falls back to
//! the full path: a path without the boundary is a configuration error.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delimiter used between id segments on every platform.
pub const DELIMITER: char = '/';

/// Stable, root-independent template identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the id (`page/home` -> `home`).
    pub fn file_name(&self) -> &str {
        self.0.rsplit(DELIMITER).next().unwrap_or(&self.0)
    }

    /// File stem of the last segment (`js/base.js` -> `base`).
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(dot) => &name[..dot],
        }
    }

    /// Relative filesystem path for this id under a cache directory.
    pub fn to_relative_path(&self) -> std::path::PathBuf {
        self.0.split(DELIMITER).collect()
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogicalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Path normalization failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("`{path}` has no `{boundary}` segment")]
    MissingBoundary { path: String, boundary: String },

    #[error("`{path}` has nothing after its `{boundary}` segment")]
    EmptyRemainder { path: String, boundary: String },
}

/// Maps source paths to [`LogicalId`]s for one boundary segment.
#[derive(Debug, Clone)]
pub struct Normalizer {
    boundary: String,
    extensions: Vec<String>,
}

impl Normalizer {
    /// `extensions` are template extensions (without dot) that get stripped.
    pub fn new(boundary: impl Into<String>, extensions: &[String]) -> Self {
        Self {
            boundary: boundary.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether `path` is a template (as opposed to a plain script asset).
    pub fn is_template(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.is_template_ext(ext))
    }

    fn is_template_ext(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Normalize a filesystem path.
    pub fn normalize(&self, path: &Path) -> Result<LogicalId, NormalizeError> {
        self.normalize_str(&path.to_string_lossy())
    }

    /// Normalize a raw path string. Both `/` and `\` count as separators,
    /// so the same template yields the same id on every platform.
    pub fn normalize_str(&self, raw: &str) -> Result<LogicalId, NormalizeError> {
        let unified = raw.replace('\\', "/");
        let segments: Vec<&str> = unified
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        let Some(pos) = segments.iter().position(|s| *s == self.boundary) else {
            return Err(NormalizeError::MissingBoundary {
                path: raw.to_string(),
                boundary: self.boundary.clone(),
            });
        };

        let rest = &segments[pos + 1..];
        let Some((last, dirs)) = rest.split_last() else {
            return Err(NormalizeError::EmptyRemainder {
                path: raw.to_string(),
                boundary: self.boundary.clone(),
            });
        };

        let last = self.strip_template_ext(last);
        let mut id = String::with_capacity(unified.len());
        for dir in dirs {
            id.push_str(dir);
            id.push(DELIMITER);
        }
        id.push_str(last);

        Ok(LogicalId(id))
    }

    fn strip_template_ext<'a>(&self, name: &'a str) -> &'a str {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && self.is_template_ext(ext) => stem,
            _ => name,
        }
    }
}
