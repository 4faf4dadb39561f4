//! Configuration for dbanalyst
//!
//! See [`Config`] for the file format and precedence rules.

mod config;

pub use config::*;
