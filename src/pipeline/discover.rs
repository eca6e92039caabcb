//! File discovery.
//!
//! Patterns are globs relative to the project root (absolute ones are used
//! as-is); a leading `!` makes a pattern an exclusion. Each pattern is split
//! into a literal base directory and a glob for the rest:
//!
//! ```text
//! bundles/*/views/**/*.riot   -> base: <root>/bundles   glob: */views/**/*.riot
//! !**/node_modules/**         -> base: <root>           glob: **/node_modules/**
//! ```
//!
//! Only include bases are walked, so a pattern rooted in `bundles/` never
//! scans the rest of the project. Hidden directories and directories added
//! with [`Patterns::skip_dir`] (the cache root) are never entered.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use jwalk::WalkDir;
use thiserror::Error;

use crate::utils::path::to_slash;

#[derive(Debug, Error)]
#[error("invalid pattern `{pattern}`")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: globset::Error,
}

/// Globs sharing one base directory.
#[derive(Debug)]
struct Rooted {
    base: PathBuf,
    set: GlobSet,
}

impl Rooted {
    fn is_match(&self, path: &Path) -> bool {
        path.strip_prefix(&self.base)
            .is_ok_and(|rel| self.set.is_match(to_slash(rel)))
    }
}

/// Compiled include and exclude patterns.
#[derive(Debug)]
pub struct Patterns {
    include: Vec<Rooted>,
    exclude: Vec<Rooted>,
    skip: Vec<PathBuf>,
}

impl Patterns {
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self, PatternError> {
        let mut include: Vec<(PathBuf, GlobSetBuilder)> = Vec::new();
        let mut exclude: Vec<(PathBuf, GlobSetBuilder)> = Vec::new();

        for pattern in patterns {
            let (negated, raw) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern.as_str()),
            };
            let (base, glob) = split_base(root, raw);
            let glob = GlobBuilder::new(&glob)
                .literal_separator(true)
                .build()
                .map_err(|source| PatternError {
                    pattern: pattern.clone(),
                    source,
                })?;

            let groups = if negated { &mut exclude } else { &mut include };
            match groups.iter_mut().find(|(b, _)| *b == base) {
                Some((_, builder)) => {
                    builder.add(glob);
                }
                None => {
                    let mut builder = GlobSetBuilder::new();
                    builder.add(glob);
                    groups.push((base, builder));
                }
            }
        }

        let build = |groups: Vec<(PathBuf, GlobSetBuilder)>| {
            groups
                .into_iter()
                .map(|(base, builder)| {
                    let set = builder.build().map_err(|source| PatternError {
                        pattern: to_slash(&base),
                        source,
                    })?;
                    Ok(Rooted { base, set })
                })
                .collect::<Result<Vec<_>, PatternError>>()
        };

        Ok(Self {
            include: build(include)?,
            exclude: build(exclude)?,
            skip: Vec::new(),
        })
    }

    /// Never select anything below `dir`, whatever the globs say.
    pub fn skip_dir(mut self, dir: &Path) -> Self {
        self.skip.push(dir.to_path_buf());
        self
    }

    fn is_skipped(&self, path: &Path) -> bool {
        self.skip.iter().any(|dir| path.starts_with(dir))
    }

    /// Whether `path` is selected by these patterns.
    pub fn matches(&self, path: &Path) -> bool {
        !self.is_skipped(path)
            && self.include.iter().any(|r| r.is_match(path))
            && !self.exclude.iter().any(|r| r.is_match(path))
    }

    /// Directories that can contain matches (walk and watch roots).
    pub fn roots(&self) -> Vec<&Path> {
        let mut roots: Vec<&Path> = self.include.iter().map(|r| r.base.as_path()).collect();
        roots.sort();
        roots.dedup();
        // Drop roots nested inside another root
        let outer = roots.clone();
        roots.retain(|r| !outer.iter().any(|o| o != r && r.starts_with(o)));
        roots
    }

    /// Walk the include roots and return every matching file, sorted.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut found = BTreeSet::new();
        for base in self.roots() {
            if base.is_file() {
                if self.matches(base) {
                    found.insert(base.to_path_buf());
                }
                continue;
            }
            let skip = self.skip.clone();
            found.extend(
                WalkDir::new(base)
                    .process_read_dir(move |_, _, _, children| {
                        children.retain(|child| {
                            child
                                .as_ref()
                                .map_or(true, |e| !skip.iter().any(|dir| e.path().starts_with(dir)))
                        });
                    })
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.path())
                    .filter(|p| self.matches(p)),
            );
        }
        found.into_iter().collect()
    }
}

/// Split a pattern into its literal leading directories and the glob rest.
/// A pattern with no glob syntax is a single file: base is its parent.
fn split_base(root: &Path, pattern: &str) -> (PathBuf, String) {
    let unified = pattern.replace('\\', "/");
    let is_glob = |s: &str| s.contains(['*', '?', '[', '{']);

    let segments: Vec<&str> = unified.split('/').collect();
    let literal = segments
        .iter()
        .position(|s| is_glob(s))
        .unwrap_or(segments.len().saturating_sub(1));

    let mut base = if unified.starts_with('/') {
        PathBuf::from("/")
    } else {
        root.to_path_buf()
    };
    for segment in &segments[..literal] {
        if !segment.is_empty() && *segment != "." {
            base.push(segment);
        }
    }
    (base, segments[literal..].join("/"))
}
