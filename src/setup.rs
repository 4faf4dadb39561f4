//! Wiring a [`Config`] into a ready [`Orchestrator`]

use std::sync::Arc;

use tracing::{info, warn};

use dbanalyst_config::Config;
use dbanalyst_engine::{LlmCompletion, Orchestrator, SessionPolicy};
use dbanalyst_llm::from_config_with_fallback;
use dbanalyst_query::SqliteBackend;
use dbanalyst_utils::error::AnalystError;

/// Open the configured database read-only
///
/// # Errors
///
/// `Config` when no database path is configured, `Database` when it cannot
/// be opened.
pub fn open_database(config: &Config) -> Result<SqliteBackend, AnalystError> {
    let path = config.database_path()?;
    Ok(SqliteBackend::open(path, config.query_timeout())?)
}

/// Database, LLM backend, policy and receipts directory from `config`
///
/// # Errors
///
/// Returns the first configuration, database or provider error.
pub async fn build_orchestrator(config: &Config) -> Result<Orchestrator, AnalystError> {
    let database = open_database(config)?;

    let (backend, fallback) = from_config_with_fallback(config)?;
    if let Some(info) = fallback {
        warn!(
            primary = %info.primary_provider,
            fallback = %info.fallback_provider,
            reason = %info.reason,
            "Primary LLM provider unavailable, using fallback"
        );
    }
    let completion = LlmCompletion::new(Arc::from(backend), config.completion_timeout());

    let policy = SessionPolicy::from_config(config);
    let mut orchestrator =
        Orchestrator::connect(Arc::new(completion), Arc::new(database), policy).await?;
    if let Some(dir) = config.receipts_dir() {
        orchestrator = orchestrator.with_receipts_dir(dir);
    }

    info!(
        provider = %config.llm_provider(),
        max_attempts = orchestrator.policy().max_attempts,
        on_exhausted = %orchestrator.policy().on_exhausted,
        "Orchestrator ready"
    );
    Ok(orchestrator)
}
