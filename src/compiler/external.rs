//! External compiler process.
//!
//! Contract: the template source is piped to stdin, `$VIEWPACK_FILE` in the
//! arguments (and the `VIEWPACK_FILE` env var) names the source file, and
//! stdout carries `{ "code": "...", "map": {...}, "name"?: "..." }`.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use super::{CompileError, CompiledUnit, TemplateCompiler};
use crate::utils::exec::Cmd;

/// Placeholder replaced with the source path in compiler arguments
pub const FILE_VAR: &str = "VIEWPACK_FILE";

#[derive(Debug, Clone)]
pub struct ExternalCompiler {
    command: Vec<String>,
    cwd: PathBuf,
}

impl ExternalCompiler {
    /// Validate the command and make sure the program can be found.
    pub fn new(command: &[String], cwd: &Path) -> Result<Self> {
        let Some(program) = command.first().filter(|p| !p.trim().is_empty()) else {
            bail!("`compiler.command` is empty");
        };

        // Bare names are resolved through PATH; explicit paths are checked as-is
        if program.contains('/') || program.contains('\\') {
            let resolved = cwd.join(program);
            if !resolved.exists() {
                bail!("compiler `{}` not found", resolved.display());
            }
        } else if which::which(program).is_err() {
            bail!("compiler `{program}` not found in PATH");
        }

        Ok(Self {
            command: command.to_vec(),
            cwd: cwd.to_path_buf(),
        })
    }

    /// Substitute `$VIEWPACK_FILE` in the configured arguments.
    fn resolve_args(&self, file: &Path) -> Vec<String> {
        let pattern = format!("${}", FILE_VAR);
        let file = file.display().to_string();
        self.command
            .iter()
            .map(|arg| arg.replace(&pattern, &file))
            .collect()
    }
}

impl TemplateCompiler for ExternalCompiler {
    fn compile(&self, source: &str, file: &Path) -> Result<CompiledUnit, CompileError> {
        let resolved = self.resolve_args(file);
        let output = Cmd::from_slice(&resolved)
            .cwd(&self.cwd)
            .envs([(FILE_VAR, file.display().to_string())])
            .stdin(source)
            .run()
            .map_err(|e| CompileError::Failed(format!("{e:#}")))?;

        parse_output(&output.stdout)
    }
}

/// Parse compiler stdout into a [`CompiledUnit`].
fn parse_output(stdout: &[u8]) -> Result<CompiledUnit, CompileError> {
    let unit: CompiledUnit = serde_json::from_slice(stdout)?;
    if unit.code.trim().is_empty() {
        return Err(CompileError::Failed("compiler returned empty code".into()));
    }
    Ok(unit)
}
