//! `[compiler]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [compiler]
//! command = ["npx", "riot-compile", "--json", "$VIEWPACK_FILE"]
//! extensions = ["riot"]
//! ```
//!
//! Files with a template extension go through the compiler; everything else
//! the target patterns match is mirrored into the cache as a plain asset.

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Program and arguments; `$VIEWPACK_FILE` is replaced with the source path
    pub command: Vec<String>,
    /// Template extensions, without the dot
    pub extensions: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: vec!["riot-compile".into(), "--json".into()],
            extensions: vec!["riot".into()],
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.command.first().is_none_or(|p| p.trim().is_empty()) {
            diag.error_with_hint(
                "compiler.command",
                "must name a program",
                "e.g. command = [\"riot-compile\", \"--json\"]",
            );
        }
        if self.extensions.is_empty() {
            diag.error("compiler.extensions", "at least one template extension is required");
        }
        for ext in &self.extensions {
            if ext.trim_start_matches('.').is_empty() {
                diag.error("compiler.extensions", format!("invalid extension `{ext}`"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_compiler_config() {
        let config = test_parse_config(
            "[compiler]\ncommand = [\"node\", \"compile.js\"]\nextensions = [\"riot\", \"tag\"]",
        );
        assert_eq!(config.compiler.command, ["node", "compile.js"]);
        assert_eq!(config.compiler.extensions, ["riot", "tag"]);
    }

    #[test]
    fn test_compiler_validation() {
        let mut diag = ConfigDiagnostics::new();
        CompilerConfig {
            command: vec![],
            extensions: vec![".".into()],
        }
        .validate(&mut diag);
        assert_eq!(diag.errors().len(), 2);

        let mut diag = ConfigDiagnostics::new();
        CompilerConfig::default().validate(&mut diag);
        assert!(diag.errors().is_empty());
    }
}
