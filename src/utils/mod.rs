//! Shared helpers.
//!
//! - [`exec`] - external command runner
//! - [`path`] - path normalization
//! - [`plural`] - count formatting

pub mod exec;
pub mod path;
pub mod plural;

pub use plural::plural_count;
