//! Call budget wrapper for metered providers

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use crate::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Default number of calls per process
pub(crate) const DEFAULT_BUDGET_LIMIT: u32 = 50;

/// Environment variable overriding the budget
pub const BUDGET_ENV_VAR: &str = "DBANALYST_OPENROUTER_BUDGET";

/// Enforces a limit on the number of invocations of the wrapped backend.
///
/// Attempted calls are counted, not successful ones, so a failing provider
/// still consumes budget. The counter lives as long as the wrapper, which is
/// shared by every session of the process.
pub struct BudgetedBackend {
    inner: Box<dyn LlmBackend>,
    calls: AtomicU32,
    limit: u32,
}

impl BudgetedBackend {
    pub fn new(inner: Box<dyn LlmBackend>, limit: u32) -> Self {
        debug!(limit, "Creating BudgetedBackend");
        Self {
            inner,
            calls: AtomicU32::new(0),
            limit,
        }
    }

    /// Resolve the limit with precedence env > config > default
    pub fn with_limit_from_config(inner: Box<dyn LlmBackend>, config_budget: Option<u32>) -> Self {
        let env_budget = std::env::var(BUDGET_ENV_VAR)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());

        let limit = match (env_budget, config_budget) {
            (Some(limit), _) => {
                debug!(limit, "Using budget limit from {}", BUDGET_ENV_VAR);
                limit
            }
            (None, Some(limit)) => {
                debug!(limit, "Using budget limit from config file");
                limit
            }
            (None, None) => DEFAULT_BUDGET_LIMIT,
        };

        Self::new(inner, limit)
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[async_trait]
impl LlmBackend for BudgetedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        // Counted before the call so retries cannot bypass the limit
        let current = self.calls.fetch_add(1, Ordering::SeqCst);

        if current >= self.limit {
            let attempted = current + 1;
            warn!(limit = self.limit, attempted, "Budget limit exceeded");
            return Err(LlmError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }

        debug!(call_count = current + 1, limit = self.limit, "Budget check passed");
        self.inner.invoke(inv).await
    }
}
