//! Shared types used across the dbanalyst crates

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an effective configuration value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Command-line flag
    Cli,
    /// Value read from a config file
    Config,
    /// Set through `ConfigBuilder`
    Programmatic,
    /// Built-in default
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cli => "cli",
            Self::Config => "config",
            Self::Programmatic => "programmatic",
            Self::Default => "default",
        };
        f.write_str(label)
    }
}
