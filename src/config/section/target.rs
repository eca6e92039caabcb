//! `[[target]]` sections.
//!
//! Each target is an independent pipeline run with its own boundary,
//! manifest, cache subdirectory and registries.
//!
//! # Example
//!
//! ```toml
//! [[target]]
//! name = "views"
//! boundary = "views"
//! patterns = ["bundles/*/views/**/*.{riot,js,ts}", "!**/node_modules/**"]
//!
//! [[target]]
//! name = "emails"
//! boundary = "emails"
//! patterns = ["bundles/*/emails/**/*"]
//! frontend = false
//! ```

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Names the manifest, cache subdirectory and registry files
    pub name: String,
    /// Path segment ids are taken relative to
    pub boundary: String,
    /// Globs relative to the project root; `!` excludes
    pub patterns: Vec<String>,
    /// Emit the client registry
    #[serde(default = "default_frontend")]
    pub frontend: bool,
}

const fn default_frontend() -> bool {
    true
}

impl TargetConfig {
    pub fn views() -> Self {
        Self {
            name: "views".into(),
            boundary: "views".into(),
            patterns: vec!["**/views/**/*".into()],
            frontend: true,
        }
    }
}

pub fn default_targets() -> Vec<TargetConfig> {
    vec![TargetConfig::views()]
}

/// Single path segment, safe as a file name.
fn is_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

pub fn validate_targets(targets: &[TargetConfig], diag: &mut ConfigDiagnostics) {
    if targets.is_empty() {
        diag.error("target", "at least one target is required");
    }

    let mut names = FxHashSet::default();
    for target in targets {
        let field = format!("target.{}", target.name);
        if !is_segment(&target.name) {
            diag.error(&field, format!("invalid target name `{}`", target.name));
        } else if !names.insert(target.name.as_str()) {
            diag.error(&field, "duplicate target name");
        }
        if !is_segment(&target.boundary) {
            diag.error_with_hint(
                format!("{field}.boundary"),
                format!("`{}` must be a single path segment", target.boundary),
                "e.g. boundary = \"views\"",
            );
        }
        if target.patterns.iter().all(|p| p.starts_with('!')) {
            diag.error(format!("{field}.patterns"), "needs at least one include pattern");
        }
    }
}
