//! `viewpack build`: run every selected target once.

use anyhow::{Result, bail};

use super::{BuildArgs, pipelines};
use crate::config::Config;
use crate::log;
use crate::pipeline::{Pipeline, PipelineError, RunSummary};
use crate::reload::ChangeFeed;
use crate::utils::plural_count;

/// Build all selected targets. Errors only on pipeline-level failure.
pub fn build(config: &Config, args: &BuildArgs) -> Result<()> {
    let feed = ChangeFeed::new();
    let mut pipelines = pipelines(config, args, &feed)?;

    let outcome = run_all(&mut pipelines);
    log!("build"; "{} compiled!", plural_count(outcome.compiled, "file"));

    if outcome.failed_targets > 0 {
        bail!(
            "build failed for {}",
            plural_count(outcome.failed_targets, "target")
        );
    }
    Ok(())
}

/// Totals across targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildOutcome {
    pub compiled: usize,
    pub failed_files: usize,
    pub failed_targets: usize,
}

/// Run each pipeline once, logging per-target failures.
pub fn run_all<'a>(pipelines: impl IntoIterator<Item = &'a mut Pipeline>) -> BuildOutcome {
    let mut outcome = BuildOutcome::default();
    for pipeline in pipelines {
        match pipeline.run() {
            Ok(summary) => outcome.add(&summary),
            Err(e) => {
                if let PipelineError::AllFailed { summary, .. } = &e {
                    outcome.add(summary);
                }
                outcome.failed_targets += 1;
                log!("error"; "{}: {}", pipeline.target().name, error_chain(&e));
            }
        }
    }
    outcome
}

impl BuildOutcome {
    fn add(&mut self, summary: &RunSummary) {
        self.compiled += summary.compiled;
        self.failed_files += summary.failed;
    }
}

/// `outer: inner: root cause` for a std error.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::testing::FakeCompiler;
    use crate::config::TargetConfig;
    use crate::pipeline::BuildSettings;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, compiler: FakeCompiler) -> Pipeline {
        let settings = BuildSettings {
            root: dir.path().to_path_buf(),
            cache: dir.path().join(".viewpack"),
            jobs: 1,
            extensions: vec!["riot".into()],
            runtime: "riot".into(),
            includes: Vec::new(),
            progress: false,
        };
        Pipeline::new(
            &TargetConfig::views(),
            &settings,
            Arc::new(compiler),
            ChangeFeed::new(),
        )
        .unwrap()
    }

    fn write(dir: &TempDir, rel: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "<x></x>").unwrap();
    }

    #[test]
    fn test_run_all_counts() {
        let dir = TempDir::new().unwrap();
        write(&dir, "views/a.riot");
        write(&dir, "views/b.riot");
        write(&dir, "views/bad.riot");

        let mut pipelines = vec![pipeline(&dir, FakeCompiler::failing("bad.riot"))];
        let outcome = run_all(&mut pipelines);
        assert_eq!(outcome.compiled, 2);
        assert_eq!(outcome.failed_files, 1);
        assert_eq!(outcome.failed_targets, 0);
    }

    #[test]
    fn test_run_all_reports_all_failed_target() {
        let dir = TempDir::new().unwrap();
        write(&dir, "views/bad.riot");

        let mut pipelines = vec![pipeline(&dir, FakeCompiler::failing("bad.riot"))];
        let outcome = run_all(&mut pipelines);
        assert_eq!(outcome.compiled, 0);
        assert_eq!(outcome.failed_files, 1);
        assert_eq!(outcome.failed_targets, 1);
    }

    #[test]
    fn test_error_chain() {
        let io = std::io::Error::other("disk full");
        let err = PipelineError::Cache(crate::cache::CacheError::new("/c/views.json", io));
        assert!(error_chain(&err).ends_with("disk full"));
    }
}
