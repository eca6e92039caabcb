//! Template compilation.
//!
//! The template language itself is handled by an external compiler; this
//! module only defines the seam ([`TemplateCompiler`]) and drives it:
//!
//! - [`external`] - runs the configured compiler command per template
//! - [`executor`] - fans stale entries out to a rayon pool and writes artifacts

pub mod executor;
pub mod external;

use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub use executor::{CompileJob, Executor, JobOutcome, compile_stale};
pub use external::ExternalCompiler;

/// Output of compiling one template.
#[derive(Debug, Clone, Deserialize)]
pub struct CompiledUnit {
    /// Generated module source
    pub code: String,
    /// Source map (opaque JSON)
    #[serde(default, alias = "sourceMap")]
    pub map: serde_json::Value,
    /// Exported component name, when the compiler reports one
    #[serde(default)]
    pub name: Option<String>,
}

/// Per-file compile failure. Never aborts the batch.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read source: {0}")]
    Read(#[from] io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("malformed compiler output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Compiles one template source into code + source map.
///
/// Implementations are shared across worker threads.
pub trait TemplateCompiler: Send + Sync {
    fn compile(&self, source: &str, file: &Path) -> Result<CompiledUnit, CompileError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process compilers for tests.

    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    /// Emits `export default { name: '<stem>' }` and records every call.
    /// Files whose name contains `fail_on` are rejected.
    #[derive(Default)]
    pub struct FakeCompiler {
        pub calls: Mutex<Vec<PathBuf>>,
        pub fail_on: Option<String>,
    }

    impl FakeCompiler {
        pub fn failing(pattern: &str) -> Self {
            Self {
                fail_on: Some(pattern.to_string()),
                ..Default::default()
            }
        }

        /// Sorted file names compiled so far.
        pub fn compiled_names(&self) -> Vec<String> {
            let mut names: Vec<String> = self
                .calls
                .lock()
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                .collect();
            names.sort();
            names
        }

        pub fn reset(&self) {
            self.calls.lock().clear();
        }
    }

    impl TemplateCompiler for FakeCompiler {
        fn compile(&self, source: &str, file: &Path) -> Result<CompiledUnit, CompileError> {
            self.calls.lock().push(file.to_path_buf());

            let name = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();

            if let Some(pattern) = &self.fail_on
                && file.to_string_lossy().contains(pattern.as_str())
            {
                return Err(CompileError::Failed(format!("unexpected token in {name}")));
            }

            Ok(CompiledUnit {
                code: format!("// {}\nexport default {{ name: '{name}' }};\n", source.trim()),
                map: serde_json::json!({ "version": 3, "sources": [name] }),
                name: None,
            })
        }
    }
}
