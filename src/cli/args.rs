//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Incremental component-template compiler
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: viewpack.toml)
    #[arg(short = 'C', long, default_value = crate::config::CONFIG_FILE, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile stale templates and regenerate the registries
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Build, then rebuild on change and push updates over websocket
    #[command(visible_alias = "w")]
    Watch {
        #[command(flatten)]
        args: BuildArgs,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// Port number for the live reload websocket
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Remove the cache directory, forcing a full rebuild
    Clean,
}

/// Shared arguments for Build and Watch
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// File globs replacing the target's configured patterns.
    /// Relative to the current directory; prefix with `!` to exclude.
    #[arg(value_name = "PATTERN")]
    pub patterns: Vec<String>,

    /// Only run this target
    #[arg(short, long)]
    pub target: Option<String>,
}
