//! Configuration management for dbanalyst
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. The TOML file has `[defaults]`, `[database]`,
//! `[llm]` and `[receipts]` sections.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

use std::path::Path;
use std::time::Duration;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use dbanalyst_utils::types::ConfigSource;
pub use model::*;

use dbanalyst_utils::error::ConfigError;

impl Config {
    /// Maximum attempts per sub-goal (initial attempt included)
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.defaults.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    #[must_use]
    pub fn on_exhausted(&self) -> OnExhausted {
        self.defaults.on_exhausted.unwrap_or_default()
    }

    #[must_use]
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .completion_timeout
                .unwrap_or(DEFAULT_COMPLETION_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .query_timeout
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn max_plan_steps(&self) -> usize {
        self.defaults.max_plan_steps.unwrap_or(DEFAULT_MAX_PLAN_STEPS)
    }

    #[must_use]
    pub fn max_context_rows(&self) -> usize {
        self.defaults
            .max_context_rows
            .unwrap_or(DEFAULT_MAX_CONTEXT_ROWS)
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.defaults.verbose.unwrap_or(false)
    }

    /// Path of the database to analyse.
    ///
    /// # Errors
    ///
    /// Returns `MissingRequired` when neither `--db` nor `[database] path` is set.
    pub fn database_path(&self) -> Result<&Path, ConfigError> {
        self.database
            .path
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired("database.path".to_string()))
    }

    /// Primary LLM provider name
    #[must_use]
    pub fn llm_provider(&self) -> &str {
        self.llm.provider.as_deref().unwrap_or(DEFAULT_LLM_PROVIDER)
    }

    /// Directory for session receipts; `None` disables receipts
    #[must_use]
    pub fn receipts_dir(&self) -> Option<&Path> {
        self.receipts.dir.as_deref()
    }
}
