//! External command execution.
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! let output = Cmd::from_slice(&["riot-compile", "--json"])
//!     .cwd(root)
//!     .envs([("VIEWPACK_FILE", "views/home.riot")])
//!     .stdin(source)
//!     .run()?;
//! ```

use anyhow::{Context, Result};
use std::{
    ffi::{OsStr, OsString},
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

/// Command builder for external process execution.
#[derive(Debug, Default, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    stdin_data: Option<Vec<u8>>,
}

impl Cmd {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Create from a command array (e.g. `["npx", "riot-compile"]`).
    pub fn from_slice<S: AsRef<OsStr>>(cmd: &[S]) -> Self {
        match cmd.split_first() {
            Some((program, args)) => Self::new(program).args(args),
            None => Self::default(),
        }
    }

    /// Add multiple arguments. Empty arguments are dropped.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            let arg = arg.as_ref();
            if !arg.is_empty() {
                self.args.push(arg.to_owned());
            }
        }
        self
    }

    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    pub fn envs<K, V, I>(mut self, vars: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in vars {
            self.envs.push((k.as_ref().to_owned(), v.as_ref().to_owned()));
        }
        self
    }

    /// Pipe `data` to the process's stdin.
    pub fn stdin<D: AsRef<[u8]>>(mut self, data: D) -> Self {
        self.stdin_data = Some(data.as_ref().to_vec());
        self
    }

    /// Program name for error messages.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Run to completion, capturing stdout/stderr.
    ///
    /// A non-zero exit status is an error carrying the trimmed stderr.
    pub fn run(self) -> Result<Output> {
        let name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().cloned())
            .stdin(if self.stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{name}`"))?;

        // Feed stdin from a separate thread so a chatty child cannot
        // deadlock on a full stdout pipe
        let writer = match (child.stdin.take(), self.stdin_data) {
            (Some(mut stdin), Some(data)) => Some(std::thread::spawn(move || {
                // A child may exit without draining stdin
                match stdin.write_all(&data) {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            })),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for `{name}`"))?;

        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| anyhow::anyhow!("stdin writer for `{name}` panicked"))?
                .with_context(|| format!("failed to write stdin to `{name}`"))?;
        }

        if !output.status.success() {
            anyhow::bail!(format_error(&name, &output));
        }

        Ok(output)
    }
}

/// Build error message from a failed command's output
fn format_error(name: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let status = output
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string());

    if stderr.is_empty() {
        format!("`{name}` exited with status {status}")
    } else {
        format!("`{name}` exited with status {status}:\n{stderr}")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_splits_program() {
        let cmd = Cmd::from_slice(&["npx", "riot", "--json"]);
        assert_eq!(cmd.program_name(), "npx");
        assert_eq!(cmd.args.len(), 2);
    }

    #[test]
    fn test_from_slice_empty_and_blank_args() {
        assert_eq!(Cmd::from_slice::<&str>(&[]).program_name(), "");
        let cmd = Cmd::from_slice(&["riot", "", "--json"]);
        assert_eq!(cmd.args, vec![OsString::from("--json")]);
    }

    #[test]
    fn test_empty_args_dropped() {
        let cmd = Cmd::new("echo").args(["a", "", "b"]);
        assert_eq!(cmd.args, vec![OsString::from("a"), OsString::from("b")]);
    }

    #[test]
    fn test_run_with_stdin() {
        let output = Cmd::new("cat").stdin("hello").run().unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello");
    }

    #[test]
    fn test_run_failure_reports_stderr() {
        let err = Cmd::from_slice(&["sh", "-c", "echo boom >&2; exit 3"])
            .run()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("status 3"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_env_passed() {
        let output = Cmd::from_slice(&["sh", "-c", "printf %s \"$VIEWPACK_FILE\""])
            .envs([("VIEWPACK_FILE", "views/a.riot")])
            .run()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "views/a.riot");
    }
}
