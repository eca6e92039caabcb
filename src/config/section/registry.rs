//! `[registry]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [registry]
//! runtime = "@frontless/riot"
//! include = [
//!     { name = "riot", path = "riot" },
//!     { name = "store", path = "./js/store.js" },
//! ]
//! ```
//!
//! Includes are emitted in order at the top of the frontend registry as
//! `import * as <name> from '<path>';`.

use serde::{Deserialize, Serialize};
use rustc_hash::FxHashSet;

use crate::config::ConfigDiagnostics;
use crate::registry::{Include, naming};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Module providing `register(name, component)`
    pub runtime: String,
    /// Ordered global includes
    pub include: Vec<Include>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            runtime: "@frontless/riot".into(),
            include: Vec::new(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.runtime.trim().is_empty() {
            diag.error("registry.runtime", "must not be empty");
        }

        let mut seen = FxHashSet::default();
        for include in &self.include {
            let field = format!("registry.include.{}", include.name);
            if naming::to_identifier(&include.name) != include.name {
                diag.error_with_hint(
                    field,
                    format!("`{}` is not a valid identifier", include.name),
                    format!("try `{}`", naming::to_identifier(&include.name)),
                );
            } else if naming::RESERVED.contains(&include.name.as_str()) {
                diag.error(field, format!("`{}` is reserved", include.name));
            } else if !seen.insert(include.name.as_str()) {
                diag.error(field, "duplicate include name");
            }
        }
    }
}
