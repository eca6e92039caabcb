//! Registry code generation.
//!
//! Both registries are regenerated in full from the manifest on every run.
//! Entries come from [`Manifest::compiled`], which iterates in id order, so
//! an unchanged manifest always produces byte-identical registries.
//!
//! - [`backend`] - CommonJS module for the server renderer
//! - [`frontend`] - ES module for the client bundle, with global includes

pub mod backend;
pub mod frontend;
pub mod naming;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::{self, CacheError, CacheLayout};
use crate::ident::LogicalId;
use crate::manifest::Manifest;
use naming::Identifiers;

/// Header line of every generated registry
pub const HEADER: &str = "// AUTOMATICALLY GENERATED VIEWPACK REGISTRY //";

/// A named module made available to every template in the frontend bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    /// Binding name (`import * as <name>`)
    pub name: String,
    /// Module specifier
    pub path: String,
}

/// One compiled component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub id: LogicalId,
    /// Exported component name
    pub name: String,
    /// Unique JavaScript binding for the frontend import
    pub ident: String,
    /// Module specifier for the compiled code
    pub module: String,
}

/// Compiled components in id order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    /// Collect every entry with a compiled descriptor. Module specifiers are
    /// relative to `base` (the directory the registries are written to) when
    /// the compiled file lives below it.
    pub fn from_manifest(manifest: &Manifest, base: &Path, includes: &[Include]) -> Self {
        let mut identifiers = Identifiers::with_reserved(
            naming::RESERVED
                .iter()
                .copied()
                .chain(includes.iter().map(|i| i.name.as_str())),
        );

        let mut registry = Self::default();
        for (entry, file) in manifest.compiled() {
            if let Some(other) = registry.entries.iter().find(|e| e.name == file.name) {
                crate::log!("registry"; "`{}` and `{}` both export `{}`", other.id, entry.id, file.name);
            }
            registry.entries.push(RegistryEntry {
                id: entry.id.clone(),
                name: file.name.clone(),
                ident: identifiers.allocate(&file.name),
                module: module_specifier(base, &file.file),
            });
        }
        registry
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Registry generation settings for one target.
#[derive(Debug, Clone)]
pub struct RegistryOptions<'a> {
    /// Module providing `register(name, component)`
    pub runtime: &'a str,
    pub includes: &'a [Include],
    /// Emit the frontend registry as well
    pub frontend: bool,
}

/// Which registry files were rewritten.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Written {
    pub backend: bool,
    pub frontend: bool,
}

/// Generate and write the registries for `manifest`.
///
/// Files are only touched when their content changed.
pub fn generate(
    manifest: &Manifest,
    layout: &CacheLayout,
    options: &RegistryOptions<'_>,
) -> Result<Written, CacheError> {
    let registry = Registry::from_manifest(manifest, layout.root(), options.includes);

    let backend = backend::render(&registry, options.runtime);
    let mut written = Written {
        backend: cache::write_if_changed(&layout.backend_registry(), &backend)?,
        frontend: false,
    };

    let frontend_file = layout.frontend_registry();
    if options.frontend {
        let frontend = frontend::render(&registry, options.runtime, options.includes);
        written.frontend = cache::write_if_changed(&frontend_file, &frontend)?;
    } else {
        // Left over from when the target still had a client registry
        cache::remove_if_exists(&frontend_file)
            .map_err(|e| CacheError::new(&frontend_file, e))?;
    }

    crate::debug!(
        "registry";
        "{} components (backend {}, frontend {})",
        registry.len(),
        if written.backend { "written" } else { "unchanged" },
        if written.frontend { "written" } else { "unchanged" }
    );
    Ok(written)
}

/// `./views/page/home.riot.js` when `file` is below `base`, else the
/// absolute path. Always `/`-separated.
fn module_specifier(base: &Path, file: &Path) -> String {
    let path: PathBuf = match file.strip_prefix(base) {
        Ok(relative) => Path::new(".").join(relative),
        Err(_) => file.to_path_buf(),
    };
    crate::utils::path::to_slash(&path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::manifest::CompiledFile;
    use std::fs;
    use tempfile::TempDir;

    /// Manifest with one compiled entry per `(id, name)` pair.
    pub(crate) fn manifest_with(dir: &Path, entries: &[(&str, &str)]) -> Manifest {
        use crate::ident::Normalizer;
        let views = dir.join("src/views");
        let paths: Vec<PathBuf> = entries
            .iter()
            .map(|(id, _)| {
                let path = views.join(format!("{id}.riot"));
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, id).unwrap();
                path
            })
            .collect();

        let mut manifest = Manifest::empty(dir.join("cache/views.json"));
        let normalizer = Normalizer::new("views", &["riot".to_string()]);
        manifest.reconcile(&paths, &normalizer).unwrap();
        for ((id, name), path) in entries.iter().zip(paths) {
            manifest.mark_compiled(
                &LogicalId::from(*id),
                CompiledFile {
                    orig: path,
                    name: name.to_string(),
                    file: dir.join(format!("cache/views/{id}.riot.js")),
                },
            );
        }
        manifest
    }

    #[test]
    fn test_registry_order_and_idents() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_with(
            dir.path(),
            &[("page/home", "home"), ("email/home", "home"), ("nav-bar", "nav-bar")],
        );
        let registry = Registry::from_manifest(&manifest, &dir.path().join("cache"), &[]);

        let ids: Vec<_> = registry.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["email/home", "nav-bar", "page/home"]);

        let idents: Vec<_> = registry.entries().iter().map(|e| e.ident.as_str()).collect();
        assert_eq!(idents, ["home", "navBar", "home2"]);

        assert_eq!(registry.entries()[0].module, "./views/email/home.riot.js");
    }

    #[test]
    fn test_include_names_are_reserved() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_with(dir.path(), &[("riot", "riot")]);
        let includes = [Include {
            name: "riot".into(),
            path: "riot".into(),
        }];
        let registry = Registry::from_manifest(&manifest, dir.path(), &includes);
        assert_eq!(registry.entries()[0].ident, "riot2");
    }

    #[test]
    fn test_module_specifier_outside_base() {
        assert_eq!(
            module_specifier(Path::new("/c"), Path::new("/elsewhere/a.js")),
            "/elsewhere/a.js"
        );
    }

    #[test]
    fn test_generate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_with(dir.path(), &[("page/home", "home")]);
        let layout = CacheLayout::new(dir.path().join("cache"), "views");
        let options = RegistryOptions {
            runtime: "@frontless/riot",
            includes: &[],
            frontend: true,
        };

        let first = generate(&manifest, &layout, &options).unwrap();
        assert_eq!(first, Written { backend: true, frontend: true });

        let backend = fs::read_to_string(layout.backend_registry()).unwrap();
        let second = generate(&manifest, &layout, &options).unwrap();
        assert_eq!(second, Written::default());
        assert_eq!(fs::read_to_string(layout.backend_registry()).unwrap(), backend);
    }

    #[test]
    fn test_backend_only_target() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_with(dir.path(), &[("welcome", "welcome")]);
        let layout = CacheLayout::new(dir.path().join("cache"), "emails");
        let options = RegistryOptions {
            runtime: "@frontless/riot",
            includes: &[],
            frontend: false,
        };

        generate(&manifest, &layout, &options).unwrap();
        assert!(layout.backend_registry().is_file());
        assert!(!layout.frontend_registry().exists());
    }
}
