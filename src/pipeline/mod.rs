//! Build orchestration for one target.
//!
//! ```text
//! Idle -> Discovering -> Reconciling -> Compiling -> Generating -> Persisting -> Idle
//!                                            \            \             \
//!                                             +------------+-------------+--> Failed
//! ```
//!
//! - **Discovering** - resolve the target's patterns to a file list
//! - **Reconciling** - merge files into the manifest, compute the stale subset
//! - **Compiling** - fan stale entries out to the worker pool, join
//! - **Generating** - regenerate registries, drop artifacts of pruned entries
//! - **Persisting** - write the manifest back, last
//!
//! Only cache I/O failures reach `Failed`; per-file compile errors are
//! counted in the [`RunSummary`]. A failed run never persists the manifest.

pub mod discover;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::{self, CacheError, CacheLayout};
use crate::compiler::{CompileJob, Executor, JobOutcome, TemplateCompiler, compile_stale};
use crate::config::{Config, TargetConfig};
use crate::ident::{NormalizeError, Normalizer};
use crate::logger::ProgressLine;
use crate::manifest::{Manifest, ManifestEntry, ManifestError};
use crate::registry::{self, Include, RegistryOptions};
use crate::reload::ChangeFeed;

pub use discover::{PatternError, Patterns};

/// Where a pipeline is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Discovering,
    Reconciling,
    Compiling,
    Generating,
    Persisting,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Reconciling => "reconciling",
            Self::Compiling => "compiling",
            Self::Generating => "generating",
            Self::Persisting => "persisting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counts for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Templates compiled this run
    pub compiled: usize,
    /// Assets mirrored this run
    pub copied: usize,
    /// Templates (or assets) that failed
    pub failed: usize,
    /// Entries removed because their source disappeared
    pub pruned: usize,
    /// Manifest size after the run
    pub total: usize,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("path normalization failed")]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to start compile workers")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("all {failed} stale templates failed to compile")]
    AllFailed { failed: usize, summary: RunSummary },
}

impl PipelineError {
    /// Errors that leave the cache in an unknown state.
    fn is_fatal(&self) -> bool {
        matches!(self, Self::Cache(_) | Self::Manifest(_))
    }
}

/// Settings shared by every target.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Project root; patterns are relative to it
    pub root: PathBuf,
    /// Cache root
    pub cache: PathBuf,
    /// Compile workers (0 = rayon default)
    pub jobs: usize,
    /// Template extensions
    pub extensions: Vec<String>,
    /// Registry runtime module
    pub runtime: String,
    pub includes: Vec<Include>,
    /// Show the progress line while compiling
    pub progress: bool,
}

impl BuildSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.get_root().to_path_buf(),
            cache: config.cache_dir().to_path_buf(),
            jobs: config.build.jobs,
            extensions: config.compiler.extensions.clone(),
            runtime: config.registry.runtime.clone(),
            includes: config.registry.include.clone(),
            progress: true,
        }
    }
}

pub struct Pipeline {
    target: TargetConfig,
    settings: BuildSettings,
    layout: CacheLayout,
    normalizer: Normalizer,
    compiler: Arc<dyn TemplateCompiler>,
    feed: ChangeFeed,
    pool: Option<rayon::ThreadPool>,
    patterns: Vec<String>,
    stage: Stage,
}

impl Pipeline {
    pub fn new(
        target: &TargetConfig,
        settings: &BuildSettings,
        compiler: Arc<dyn TemplateCompiler>,
        feed: ChangeFeed,
    ) -> Result<Self, PipelineError> {
        let pool = match settings.jobs {
            0 => None,
            jobs => Some(rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?),
        };

        Ok(Self {
            layout: CacheLayout::new(&settings.cache, &target.name),
            normalizer: Normalizer::new(&target.boundary, &settings.extensions),
            patterns: target.patterns.clone(),
            target: target.clone(),
            settings: settings.clone(),
            compiler,
            feed,
            pool,
            stage: Stage::Idle,
        })
    }

    /// Replace the target's patterns for this pipeline.
    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Compiled include/exclude patterns. Nothing under the cache root is
    /// ever selected.
    pub fn patterns(&self) -> Result<Patterns, PatternError> {
        Ok(Patterns::new(&self.settings.root, &self.patterns)?.skip_dir(&self.settings.cache))
    }

    /// Run every stage once.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let result = self.run_stages();
        match &result {
            Err(e) if e.is_fatal() => self.enter(Stage::Failed),
            _ => self.enter(Stage::Idle),
        }
        result
    }

    fn enter(&mut self, stage: Stage) {
        crate::debug!("pipeline"; "{}: {} -> {}", self.target.name, self.stage, stage);
        self.stage = stage;
    }

    fn run_stages(&mut self) -> Result<RunSummary, PipelineError> {
        self.enter(Stage::Discovering);
        let files = self.patterns()?.discover();

        self.enter(Stage::Reconciling);
        let mut manifest = Manifest::load(self.layout.manifest_file());
        let reconciled = manifest.reconcile(&files, &self.normalizer)?;
        for (id, dropped, kept) in &reconciled.collisions {
            crate::log!(
                "manifest";
                "`{}` and `{}` both map to `{}`, keeping the latter",
                dropped.display(),
                kept.display(),
                id
            );
        }
        if manifest.is_empty() {
            crate::log!("build"; "{}: no files match {:?}", self.target.name, self.patterns);
        }
        let jobs = self.stale_jobs(&manifest);

        self.enter(Stage::Compiling);
        let mut summary = self.compile(&mut manifest, &jobs)?;
        summary.pruned = reconciled.pruned.len();

        self.enter(Stage::Generating);
        let options = RegistryOptions {
            runtime: &self.settings.runtime,
            includes: &self.settings.includes,
            frontend: self.target.frontend,
        };
        registry::generate(&manifest, &self.layout, &options)?;
        self.prune_artifacts(&reconciled.pruned);

        self.enter(Stage::Persisting);
        manifest.persist()?;
        summary.total = manifest.len();

        crate::debug!(
            "build";
            "{}: {} compiled, {} copied, {} failed, {} pruned, {} total",
            self.target.name,
            summary.compiled,
            summary.copied,
            summary.failed,
            summary.pruned,
            summary.total
        );

        let stale_templates = jobs.iter().filter(|j| j.is_template).count();
        if stale_templates > 0 && summary.compiled == 0 {
            return Err(PipelineError::AllFailed {
                failed: summary.failed,
                summary,
            });
        }
        Ok(summary)
    }

    fn stale_jobs(&self, manifest: &Manifest) -> Vec<CompileJob> {
        manifest
            .entries()
            .filter(|entry| manifest.is_stale(&entry.id, &self.layout, &self.normalizer))
            .map(|entry| CompileJob {
                id: entry.id.clone(),
                source: entry.path.clone(),
                is_template: self.normalizer.is_template(&entry.path),
            })
            .collect()
    }

    /// Run the executor and fold its outcomes into the manifest.
    fn compile(
        &self,
        manifest: &mut Manifest,
        jobs: &[CompileJob],
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        if jobs.is_empty() {
            return Ok(summary);
        }

        let templates = jobs.iter().filter(|j| j.is_template).count();
        let progress = self
            .settings
            .progress
            .then(|| ProgressLine::new(&[("templates", templates), ("assets", jobs.len() - templates)]));

        let executor = Executor {
            layout: &self.layout,
            compiler: self.compiler.as_ref(),
            feed: &self.feed,
            progress: progress.as_ref(),
        };
        let outcomes = compile_stale(&executor, jobs, self.pool.as_ref())?;

        if let Some(progress) = progress {
            progress.finish();
        }

        for outcome in outcomes {
            match outcome {
                JobOutcome::Compiled { id, file } => {
                    manifest.mark_compiled(&id, file);
                    summary.compiled += 1;
                }
                JobOutcome::Copied { id } => {
                    manifest.mark_observed(&id);
                    summary.copied += 1;
                }
                JobOutcome::Failed { id, error } => {
                    crate::debug!("build"; "{} stays stale ({})", id, error);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Remove cache files of entries whose source is gone. Best effort.
    fn prune_artifacts(&self, pruned: &[ManifestEntry]) {
        for entry in pruned {
            let is_template = self.normalizer.is_template(&entry.path);
            let raw = self.layout.raw_copy(&entry.id, &entry.path, is_template);
            let mut paths = vec![raw.clone()];
            if is_template {
                paths.push(CacheLayout::compiled_code(&raw));
                paths.push(CacheLayout::source_map(&raw));
            }
            for path in paths {
                if let Err(e) = cache::remove_if_exists(&path) {
                    crate::log!("cache"; "failed to remove {}: {}", path.display(), e);
                }
            }
            crate::debug!("cache"; "pruned {}", entry.id);
        }
    }
}
