//! `viewpack watch`: build once, then rebuild affected targets on change.
//!
//! ```text
//! notify -> Debouncer (timing, dedup) -> affected targets -> Pipeline::run
//!                                                              |
//!                                          ChangeFeed -> ReloadServer -> clients
//! ```
//!
//! The watcher is started before the initial build so edits made while it
//! runs are picked up by the first rebuild.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam::channel::{self, Receiver};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use super::build::run_all;
use super::{BuildArgs, pipelines};
use crate::config::Config;
use crate::logger::{status_error, status_success, status_unchanged};
use crate::pipeline::{Pipeline, Patterns};
use crate::reload::{ChangeFeed, HotReloadMessage, ReloadServer};
use crate::utils::path::normalize_path;
use crate::utils::plural_count;
use crate::{debug, log};

/// Quiet period after the last event before rebuilding
const DEBOUNCE_MS: u64 = 300;

pub fn watch(
    config: &Config,
    args: &BuildArgs,
    interface: Option<IpAddr>,
    port: Option<u16>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))?;

    let feed = ChangeFeed::new();
    let pipelines = pipelines(config, args, &feed)?;
    let mut watched = Vec::with_capacity(pipelines.len());
    for pipeline in pipelines {
        let patterns = pipeline
            .patterns()
            .with_context(|| format!("invalid patterns for `{}`", pipeline.target().name))?;
        watched.push(Watched { pipeline, patterns });
    }

    let (event_tx, event_rx) = channel::unbounded();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        let _ = event_tx.send(res);
    })?;
    for root in watch_roots(&watched) {
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {}", root.display()))?;
        debug!("watch"; "watching {}", root.display());
    }

    let interface = interface.unwrap_or(config.serve.interface).to_string();
    let server = ReloadServer::start(&interface, port.unwrap_or(config.serve.port), &feed)?;

    let mut all: Vec<&mut Pipeline> = watched.iter_mut().map(|w| &mut w.pipeline).collect();
    rebuild(&mut all, &server);

    log!("watch"; "watching for changes, press Ctrl+C to stop");
    let ignored = normalize_path(config.cache_dir());
    event_loop(&mut watched, &event_rx, &shutdown_rx, &ignored, &server);

    log!("watch"; "shutting down...");
    Ok(())
}

/// A pipeline with its compiled patterns.
struct Watched {
    pipeline: Pipeline,
    patterns: Patterns,
}

fn event_loop(
    watched: &mut [Watched],
    events: &Receiver<notify::Result<notify::Event>>,
    shutdown: &Receiver<()>,
    ignored: &Path,
    server: &ReloadServer,
) {
    let mut debouncer = Debouncer::new(ignored);
    loop {
        channel::select! {
            recv(shutdown) -> _ => return,
            recv(events) -> event => match event {
                Ok(Ok(event)) => debouncer.add_event(&event),
                Ok(Err(e)) => log!("watch"; "notify error: {}", e),
                Err(_) => return,
            },
            default(debouncer.sleep_duration()) => {
                if let Some(changed) = debouncer.take_if_ready() {
                    let mut affected = affected(watched, &changed);
                    if affected.is_empty() {
                        debug!("watch"; "{} outside every target", plural_count(changed.len(), "change"));
                    } else {
                        rebuild(&mut affected, server);
                    }
                }
            }
        }
    }
}

/// Pipelines whose patterns select any changed path.
///
/// A removed directory cannot be matched against file globs, so any path
/// that no longer exists under a pipeline's roots also counts.
fn affected<'a>(watched: &'a mut [Watched], changed: &FxHashSet<PathBuf>) -> Vec<&'a mut Pipeline> {
    watched
        .iter_mut()
        .filter(|w| {
            changed.iter().any(|path| {
                w.patterns.matches(path)
                    || (!path.exists() && w.patterns.roots().iter().any(|r| path.starts_with(r)))
            })
        })
        .map(|w| &mut w.pipeline)
        .collect()
}

/// Re-run `pipelines` and show the result in the status block.
fn rebuild(pipelines: &mut [&mut Pipeline], server: &ReloadServer) {
    let names: Vec<String> = pipelines.iter().map(|p| p.target().name.clone()).collect();
    let names = names.join(", ");
    let outcome = run_all(pipelines.iter_mut().map(|p| &mut **p));

    if outcome.failed_targets > 0 {
        status_error(
            &format!("build failed for {names}"),
            &format!("{} compiled before the failure", plural_count(outcome.compiled, "file")),
        );
        debug!("reload"; "reloading {}", plural_count(server.client_count(), "client"));
        server.broadcast(&HotReloadMessage::reload_with_reason("build failed"));
    } else if outcome.failed_files > 0 {
        status_error(
            &format!("{} in {names}", plural_count(outcome.failed_files, "error")),
            &format!("{} compiled", plural_count(outcome.compiled, "file")),
        );
    } else if outcome.compiled > 0 {
        status_success(&format!(
            "{names}: {} compiled",
            plural_count(outcome.compiled, "file")
        ));
    } else {
        status_unchanged(&format!("{names}: up to date"));
    }
}

/// Existing directories to watch: every pipeline's pattern roots, with
/// nested ones folded into their parent. A root that does not exist yet is
/// replaced by its nearest existing ancestor.
fn watch_roots(watched: &[Watched]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = watched
        .iter()
        .flat_map(|w| w.patterns.roots())
        .filter_map(|root| root.ancestors().find(|a| a.is_dir()).map(Path::to_path_buf))
        .collect();
    roots.sort();
    roots.dedup();
    let outer = roots.clone();
    roots.retain(|r| !outer.iter().any(|o| o != r && r.starts_with(o)));
    roots
}

/// Editor artifacts and hidden files
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Collects changed paths until events stop arriving for [`DEBOUNCE_MS`].
struct Debouncer {
    changes: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    ignored: PathBuf,
}

impl Debouncer {
    fn new(ignored: &Path) -> Self {
        Self {
            changes: FxHashSet::default(),
            last_event: None,
            ignored: ignored.to_path_buf(),
        }
    }

    fn add_event(&mut self, event: &notify::Event) {
        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            // Metadata-only changes (mtime/chmod) are noise
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => {}
            _ => return,
        }

        for path in &event.paths {
            let path = normalize_path(path);
            if is_temp_file(&path) || path.starts_with(&self.ignored) {
                continue;
            }
            debug!("watch"; "{:?}: {}", event.kind, path.display());
            self.changes.insert(path);
            self.last_event = Some(Instant::now());
        }
    }

    fn is_ready(&self) -> bool {
        self.last_event
            .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
            && !self.changes.is_empty()
    }

    fn take_if_ready(&mut self) -> Option<FxHashSet<PathBuf>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;
        Some(std::mem::take(&mut self.changes))
    }

    /// How long to wait before the batch can be ready.
    fn sleep_duration(&self) -> Duration {
        match self.last_event {
            Some(t) => Duration::from_millis(DEBOUNCE_MS).saturating_sub(t.elapsed()),
            None => Duration::from_secs(3600),
        }
    }
}
