use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use dbanalyst_utils::error::ConfigError;

use super::discovery::DEFAULTED_KEYS;
use super::{
    Config, ConfigSource, DatabaseConfig, Defaults, LlmConfig, OnExhausted, ReceiptsConfig,
};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// ```rust
    /// use dbanalyst_config::{Config, OnExhausted};
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .database_path("analytics.db")
    ///     .max_attempts(2)
    ///     .on_exhausted(OnExhausted::Continue)
    ///     .query_timeout(Duration::from_secs(5))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.max_attempts(), 2);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration.
///
/// Ignores config files and environment variables. Every value set here is
/// attributed to `ConfigSource::Programmatic`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    database_path: Option<PathBuf>,
    llm_provider: Option<String>,
    fallback_provider: Option<String>,
    model: Option<String>,
    max_attempts: Option<u32>,
    on_exhausted: Option<OnExhausted>,
    completion_timeout: Option<Duration>,
    query_timeout: Option<Duration>,
    max_plan_steps: Option<usize>,
    max_context_rows: Option<usize>,
    receipts_dir: Option<PathBuf>,
    verbose: Option<bool>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Primary LLM provider (`anthropic` or `openrouter`)
    #[must_use]
    pub fn llm_provider(mut self, provider: impl Into<String>) -> Self {
        self.llm_provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn fallback_provider(mut self, provider: impl Into<String>) -> Self {
        self.fallback_provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attempts per sub-goal, 1..=10. Default: 3.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn on_exhausted(mut self, policy: OnExhausted) -> Self {
        self.on_exhausted = Some(policy);
        self
    }

    /// Whole seconds are kept; anything under one second fails validation.
    #[must_use]
    pub fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = Some(timeout);
        self
    }

    /// Whole seconds are kept; anything under one second fails validation.
    #[must_use]
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_plan_steps(mut self, steps: usize) -> Self {
        self.max_plan_steps = Some(steps);
        self
    }

    #[must_use]
    pub fn max_context_rows(mut self, rows: usize) -> Self {
        self.max_context_rows = Some(rows);
        self
    }

    #[must_use]
    pub fn receipts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.receipts_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for out-of-range values.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut source_attribution: HashMap<String, ConfigSource> = DEFAULTED_KEYS
            .iter()
            .map(|key| (key.to_string(), ConfigSource::Default))
            .collect();
        let mut mark = |key: &str| {
            source_attribution.insert(key.to_string(), ConfigSource::Programmatic);
        };

        let mut defaults = Defaults::default();
        let mut database = DatabaseConfig::default();
        let mut llm = LlmConfig::default();
        let mut receipts = ReceiptsConfig::default();

        if let Some(value) = self.max_attempts {
            defaults.max_attempts = Some(value);
            mark("max_attempts");
        }
        if let Some(value) = self.on_exhausted {
            defaults.on_exhausted = Some(value);
            mark("on_exhausted");
        }
        if let Some(value) = self.completion_timeout {
            defaults.completion_timeout = Some(value.as_secs());
            mark("completion_timeout");
        }
        if let Some(value) = self.query_timeout {
            defaults.query_timeout = Some(value.as_secs());
            mark("query_timeout");
        }
        if let Some(value) = self.max_plan_steps {
            defaults.max_plan_steps = Some(value);
            mark("max_plan_steps");
        }
        if let Some(value) = self.max_context_rows {
            defaults.max_context_rows = Some(value);
            mark("max_context_rows");
        }
        if let Some(value) = self.verbose {
            defaults.verbose = Some(value);
            mark("verbose");
        }
        if let Some(value) = self.database_path {
            database.path = Some(value);
            mark("database_path");
        }
        if let Some(value) = self.llm_provider {
            llm.provider = Some(value);
            mark("llm_provider");
        }
        if let Some(value) = self.fallback_provider {
            llm.fallback_provider = Some(value);
            mark("llm_fallback_provider");
        }
        if let Some(value) = self.model {
            llm.model = Some(value);
            mark("llm_model");
        }
        if let Some(value) = self.receipts_dir {
            receipts.dir = Some(value);
            mark("receipts_dir");
        }

        let config = Config {
            defaults,
            database,
            llm,
            receipts,
            source_attribution,
        };
        config.validate()?;
        Ok(config)
    }
}
