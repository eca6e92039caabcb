//! Configuration section definitions.
//!
//! | Module     | TOML Section   | Purpose                              |
//! |------------|----------------|--------------------------------------|
//! | `build`    | `[build]`      | Cache root, worker count             |
//! | `compiler` | `[compiler]`   | External compiler, template exts     |
//! | `registry` | `[registry]`   | Runtime module, global includes      |
//! | `serve`    | `[serve]`      | Live reload websocket                |
//! | `target`   | `[[target]]`   | Boundary and patterns per target     |

mod build;
mod compiler;
mod registry;
mod serve;
mod target;

pub use build::BuildConfig;
pub use compiler::CompilerConfig;
pub use registry::RegistryConfig;
pub use serve::ServeConfig;
pub use target::{TargetConfig, default_targets, validate_targets};
