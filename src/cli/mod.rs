//! Command-line interface for dbanalyst
//!
//! - `args`: clap definitions
//! - `run`: entry point and dispatch
//! - `commands`: command implementations
//! - `render`: human-readable event rendering

pub mod args;
mod commands;
pub mod render;
mod run;

#[cfg(test)]
mod tests;

pub use args::{Cli, Commands, build_cli};
pub use run::run;
