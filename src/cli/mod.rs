//! Command-line interface module.

mod args;
pub mod build;
pub mod clean;
pub mod watch;

pub use args::{BuildArgs, Cli, Commands};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::compiler::{ExternalCompiler, TemplateCompiler};
use crate::config::{Config, TargetConfig};
use crate::pipeline::{BuildSettings, Pipeline};
use crate::reload::ChangeFeed;
use crate::utils::path::to_slash;

/// Build one pipeline per selected target, sharing the compiler and feed.
pub fn pipelines(config: &Config, args: &BuildArgs, feed: &ChangeFeed) -> Result<Vec<Pipeline>> {
    let compiler: Arc<dyn TemplateCompiler> = Arc::new(
        ExternalCompiler::new(&config.compiler.command, config.get_root())
            .context("cannot use the configured template compiler")?,
    );
    let settings = BuildSettings::from_config(config);

    let cwd = std::env::current_dir().context("Failed to get current working directory")?;
    let patterns = resolve_patterns(&args.patterns, &cwd, config.get_root());

    select_targets(config, args)?
        .into_iter()
        .map(|target| {
            let pipeline =
                Pipeline::new(target, &settings, Arc::clone(&compiler), feed.clone())
                    .with_context(|| format!("cannot set up target `{}`", target.name))?;
            Ok(if patterns.is_empty() {
                pipeline
            } else {
                pipeline.with_patterns(patterns.clone())
            })
        })
        .collect()
}

/// Targets to run: the one named by `--target`, the first one when
/// positional patterns are given, otherwise all of them.
fn select_targets<'a>(config: &'a Config, args: &BuildArgs) -> Result<Vec<&'a TargetConfig>> {
    if let Some(name) = &args.target {
        let Some(target) = config.target(name) else {
            let known: Vec<_> = config.targets.iter().map(|t| t.name.as_str()).collect();
            bail!("unknown target `{}` (configured: {})", name, known.join(", "));
        };
        return Ok(vec![target]);
    }

    if !args.patterns.is_empty() {
        return Ok(config.targets.iter().take(1).collect());
    }
    Ok(config.targets.iter().collect())
}

/// Rewrite command-line patterns (relative to `cwd`) to be relative to the
/// project root, keeping a leading `!`.
fn resolve_patterns(patterns: &[String], cwd: &Path, root: &Path) -> Vec<String> {
    let prefix = match cwd.strip_prefix(root) {
        Ok(rel) => to_slash(rel),
        Err(_) => to_slash(cwd),
    };

    patterns
        .iter()
        .map(|pattern| {
            let (bang, raw) = match pattern.strip_prefix('!') {
                Some(rest) => ("!", rest),
                None => ("", pattern.as_str()),
            };
            let raw = raw.replace('\\', "/");
            if raw.starts_with('/') || Path::new(&raw).is_absolute() || prefix.is_empty() {
                format!("{bang}{raw}")
            } else {
                format!("{bang}{prefix}/{}", raw.trim_start_matches("./"))
            }
        })
        .collect()
}
