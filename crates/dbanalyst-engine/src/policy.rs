//! Session limits and the exhausted-retry policy

use std::time::Duration;

use dbanalyst_config::{
    Config, DEFAULT_COMPLETION_TIMEOUT_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONTEXT_ROWS,
    DEFAULT_MAX_PLAN_STEPS, DEFAULT_QUERY_TIMEOUT_SECS, OnExhausted,
};

/// Limits applied to every session of one orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Attempts per sub-goal, the initial one included
    pub max_attempts: u32,
    pub on_exhausted: OnExhausted,
    pub completion_timeout: Duration,
    pub query_timeout: Duration,
    pub max_plan_steps: usize,
    /// Rows per step handed to later prompts and carried in `sql_executed`
    pub max_context_rows: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            on_exhausted: OnExhausted::default(),
            completion_timeout: Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            max_plan_steps: DEFAULT_MAX_PLAN_STEPS,
            max_context_rows: DEFAULT_MAX_CONTEXT_ROWS,
        }
    }
}

impl SessionPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts().max(1),
            on_exhausted: config.on_exhausted(),
            completion_timeout: config.completion_timeout(),
            query_timeout: config.query_timeout(),
            max_plan_steps: config.max_plan_steps().max(1),
            max_context_rows: config.max_context_rows(),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_on_exhausted(mut self, on_exhausted: OnExhausted) -> Self {
        self.on_exhausted = on_exhausted;
        self
    }

    #[must_use]
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}
