//! viewpack - incremental component-template compiler.
//!
//! Compiles a tree of template files into a server registry and a client
//! registry, recompiling only what changed since the last run.

mod cache;
mod cli;
mod compiler;
mod config;
mod ident;
mod logger;
mod manifest;
mod pipeline;
mod registry;
mod reload;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = Config::load(&cli.config)?;

    match &cli.command {
        Commands::Build { args } => cli::build::build(&config, args),
        Commands::Watch {
            args,
            interface,
            port,
        } => cli::watch::watch(&config, args, *interface, *port),
        Commands::Clean => cli::clean::clean(&config),
    }
}
