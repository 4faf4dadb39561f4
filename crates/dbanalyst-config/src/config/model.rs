use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use dbanalyst_utils::types::ConfigSource;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_PLAN_STEPS: usize = 5;
pub const DEFAULT_MAX_CONTEXT_ROWS: usize = 50;
pub const DEFAULT_LLM_PROVIDER: &str = "anthropic";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "DBANALYST_CONFIG";
/// Environment variable overriding `[llm] provider`
pub const PROVIDER_ENV: &str = "DBANALYST_LLM_PROVIDER";

/// What a session does once a sub-goal has used all of its attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExhausted {
    /// End the session with `session_failed` (default)
    #[default]
    Abort,
    /// Record the sub-goal as undetermined and move on
    Continue,
}

impl OnExhausted {
    /// Parse a policy name
    ///
    /// # Errors
    ///
    /// Returns an error if the name is neither `abort` nor `continue`.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            _ => Err(format!(
                "Unknown exhaustion policy '{s}'. Must be 'abort' or 'continue'"
            )),
        }
    }
}

impl std::fmt::Display for OnExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

/// Configuration for dbanalyst.
///
/// Precedence: CLI arguments > config file > built-in defaults.
///
/// # Discovery
///
/// [`Config::discover()`] uses, in order: `--config`, the `DBANALYST_CONFIG`
/// environment variable, then an upward search for `.dbanalyst/config.toml`
/// that stops at the repository root.
///
/// # Configuration File Format
///
/// ```toml
/// [defaults]
/// max_attempts = 3
/// on_exhausted = "abort"
/// completion_timeout = 120
/// query_timeout = 30
///
/// [database]
/// path = "data/analytics.db"
///
/// [llm]
/// provider = "anthropic"
/// fallback_provider = "openrouter"
///
/// [llm.anthropic]
/// model = "claude-sonnet-4-5"
///
/// [receipts]
/// dir = ".dbanalyst/receipts"
/// ```
///
/// Relative paths are resolved against the directory that holds
/// `.dbanalyst/`.
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub receipts: ReceiptsConfig,
    /// Source attribution for each setting (for `dbanalyst config`).
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Session policy and limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    pub max_attempts: Option<u32>,
    pub on_exhausted: Option<OnExhausted>,
    /// Seconds allowed for one completion call
    pub completion_timeout: Option<u64>,
    /// Seconds allowed for one query
    pub query_timeout: Option<u64>,
    /// Longer plans are truncated
    pub max_plan_steps: Option<usize>,
    /// Rows per earlier step passed to the SQL generator
    pub max_context_rows: Option<usize>,
    pub verbose: Option<bool>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            on_exhausted: Some(OnExhausted::Abort),
            completion_timeout: Some(DEFAULT_COMPLETION_TIMEOUT_SECS),
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT_SECS),
            max_plan_steps: Some(DEFAULT_MAX_PLAN_STEPS),
            max_context_rows: Some(DEFAULT_MAX_CONTEXT_ROWS),
            verbose: Some(false),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

/// LLM provider configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub fallback_provider: Option<String>,
    /// Model override applied to whichever provider is selected
    pub model: Option<String>,
    pub anthropic: Option<AnthropicConfig>,
    pub openrouter: Option<OpenRouterConfig>,
}

/// OpenRouter HTTP provider configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenRouterConfig {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Maximum number of calls per process
    pub budget: Option<u32>,
}

/// Anthropic HTTP provider configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnthropicConfig {
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReceiptsConfig {
    pub dir: Option<PathBuf>,
}
