//! Parallel compile fan-out.
//!
//! Each stale entry is an independent [`CompileJob`]: it only touches its own
//! cache sub-path, so jobs run on a rayon pool without coordination. Workers
//! return [`JobOutcome`]s instead of touching the manifest; the orchestrator
//! applies them after the join.
//!
//! Per job:
//! 1. mirror the raw source into the cache (kept even if compilation fails)
//! 2. assets stop here
//! 3. templates go through the compiler; code and source map are written
//!    next to the raw copy, then a change event is published
//!
//! A compiler error only fails its own job. Cache write errors abort the run.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::{CompileError, CompiledUnit, TemplateCompiler};
use crate::cache::{self, CacheError, CacheLayout};
use crate::ident::LogicalId;
use crate::logger::ProgressLine;
use crate::manifest::CompiledFile;
use crate::reload::{BuildEvent, ChangeEvent, ChangeFeed};

/// One stale manifest entry to process.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub id: LogicalId,
    pub source: PathBuf,
    pub is_template: bool,
}

/// Result of one job, applied to the manifest after the join.
#[derive(Debug)]
pub enum JobOutcome {
    /// Template compiled and written
    Compiled { id: LogicalId, file: CompiledFile },
    /// Plain asset mirrored into the cache
    Copied { id: LogicalId },
    /// Compile failed; the entry stays stale
    Failed { id: LogicalId, error: CompileError },
}

/// Shared, read-only state for all workers.
pub struct Executor<'a> {
    pub layout: &'a CacheLayout,
    pub compiler: &'a dyn TemplateCompiler,
    pub feed: &'a ChangeFeed,
    pub progress: Option<&'a ProgressLine>,
}

/// Run every job, in parallel, and wait for all of them.
///
/// Outcomes are returned in job order. The first cache I/O error wins.
pub fn compile_stale(
    executor: &Executor<'_>,
    jobs: &[CompileJob],
    pool: Option<&rayon::ThreadPool>,
) -> Result<Vec<JobOutcome>, CacheError> {
    executor.layout.ensure()?;

    let run = || {
        jobs.par_iter()
            .map(|job| executor.run_job(job))
            .collect::<Result<Vec<_>, _>>()
    };

    match pool {
        Some(pool) => pool.install(run),
        None => run(),
    }
}

impl Executor<'_> {
    fn run_job(&self, job: &CompileJob) -> Result<JobOutcome, CacheError> {
        let raw = self.layout.raw_copy(&job.id, &job.source, job.is_template);
        let counter = if job.is_template { "templates" } else { "assets" };

        let bytes = match fs::read(&job.source) {
            Ok(bytes) => bytes,
            Err(e) => return Ok(self.fail(job, counter, CompileError::Read(e))),
        };

        write_file(&raw, &bytes)?;

        if !job.is_template {
            self.tick(counter);
            return Ok(JobOutcome::Copied { id: job.id.clone() });
        }

        let source = match String::from_utf8(bytes) {
            Ok(source) => source,
            Err(e) => {
                let error = std::io::Error::new(std::io::ErrorKind::InvalidData, e);
                return Ok(self.fail(job, counter, CompileError::Read(error)));
            }
        };

        let unit = match self.compiler.compile(&source, &job.source) {
            Ok(unit) => unit,
            Err(error) => return Ok(self.fail(job, counter, error)),
        };

        let file = write_outputs(&raw, &unit)?;
        let name = export_name(&job.id, &unit);

        self.feed.publish(BuildEvent::Changed(ChangeEvent {
            id: job.id.clone(),
            orig: job.source.clone(),
            file: file.clone(),
            name: name.clone(),
            code: unit.code,
        }));
        self.tick(counter);

        crate::debug!("compile"; "{} -> {}", job.id, name);
        Ok(JobOutcome::Compiled {
            id: job.id.clone(),
            file: CompiledFile {
                orig: job.source.clone(),
                name,
                file,
            },
        })
    }

    fn fail(&self, job: &CompileJob, counter: &str, error: CompileError) -> JobOutcome {
        crate::log!("error"; "failed to compile {}: {}", job.id, error);
        self.feed.publish(BuildEvent::Failed {
            id: job.id.clone(),
            path: job.source.clone(),
            error: error.to_string(),
        });
        self.tick(counter);
        JobOutcome::Failed {
            id: job.id.clone(),
            error,
        }
    }

    fn tick(&self, counter: &str) {
        if let Some(progress) = self.progress {
            progress.inc(counter);
        }
    }
}

/// Exported name: the compiler's answer, else the id's file stem.
fn export_name(id: &LogicalId, unit: &CompiledUnit) -> String {
    unit.name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| id.stem())
        .to_string()
}

/// Replace previous code and map with the new ones. Returns the code path.
fn write_outputs(raw: &Path, unit: &CompiledUnit) -> Result<PathBuf, CacheError> {
    let code_path = CacheLayout::compiled_code(raw);
    let map_path = CacheLayout::source_map(raw);

    for stale in [&code_path, &map_path] {
        cache::remove_if_exists(stale).map_err(|e| CacheError::new(stale, e))?;
    }

    let map = serde_json::to_string(&unit.map)
        .map_err(|e| CacheError::new(&map_path, std::io::Error::other(e)))?;

    write_file(&code_path, unit.code.as_bytes())?;
    write_file(&map_path, map.as_bytes())?;
    Ok(code_path)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CacheError::new(parent, e))?;
    }
    fs::write(path, bytes).map_err(|e| CacheError::new(path, e))
}
