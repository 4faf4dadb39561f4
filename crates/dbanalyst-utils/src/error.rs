use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Library-level error type with user-friendly reporting.
///
/// `AnalystError` is returned by setup and I/O operations (configuration
/// discovery, backend construction, opening the database, writing receipts).
/// Failures *inside* a session never surface as `AnalystError`: they become
/// data in the run state and, when fatal, a terminal `session_failed` event.
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration/CLI argument errors |
/// | 3 | Database unavailable |
/// | 4 | Session failed |
/// | 70 | LLM backend failure |
/// | 130 | Session interrupted |
/// | 1 | Other errors |
#[derive(Error, Debug)]
pub enum AnalystError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Session {session_id} failed ({reason}): {message}")]
    SessionFailed {
        session_id: String,
        reason: String,
        message: String,
    },

    #[error("Session {session_id} interrupted")]
    Interrupted { session_id: String },
}

impl AnalystError {
    /// Map this error onto the documented CLI exit codes.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Llm(_) => ExitCode::LLM_FAILURE,
            Self::Database(_) => ExitCode::DATABASE_UNAVAILABLE,
            Self::SessionFailed { .. } => ExitCode::SESSION_FAILED,
            Self::Interrupted { .. } => ExitCode::INTERRUPTED,
            Self::Io(_) => ExitCode::INTERNAL,
        }
    }

    /// Render message, context and suggestions for a terminal user.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("✗ {}", self.user_message());
        if let Some(context) = self.context() {
            out.push_str(&format!("\n  {context}"));
        }
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\n\nSuggestions:");
            for suggestion in suggestions {
                out.push_str(&format!("\n  • {suggestion}"));
            }
        }
        out
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    LlmIntegration,
    Database,
    Session,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::LlmIntegration => write!(f, "LLM Integration"),
            Self::Database => write!(f, "Database"),
            Self::Session => write!(f, "Session"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

impl UserFriendlyError for AnalystError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Database(e) => e.user_message(),
            Self::Io(e) => format!("File system error: {e}"),
            Self::SessionFailed {
                reason, message, ..
            } => format!("Analysis failed ({reason}): {message}"),
            Self::Interrupted { .. } => "Session cancelled".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Llm(e) => e.context(),
            Self::Database(e) => e.context(),
            Self::Io(_) => None,
            Self::SessionFailed { session_id, .. } | Self::Interrupted { session_id } => {
                Some(format!("Session id: {session_id}"))
            }
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Llm(e) => e.suggestions(),
            Self::Database(e) => e.suggestions(),
            Self::Io(_) => vec!["Check file permissions and available disk space".to_string()],
            Self::SessionFailed { .. } => vec![
                "Rephrase the question or make it more specific".to_string(),
                "Run with --verbose to see every planning and query step".to_string(),
            ],
            Self::Interrupted { .. } => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Llm(_) => ErrorCategory::LlmIntegration,
            Self::Database(_) => ErrorCategory::Database,
            Self::Io(_) => ErrorCategory::FileSystem,
            Self::SessionFailed { .. } | Self::Interrupted { .. } => ErrorCategory::Session,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(msg) => format!("Configuration file could not be read: {msg}"),
            Self::MissingRequired(key) => format!("Required setting '{key}' is not configured"),
            Self::InvalidValue { key, value } => format!("Setting '{key}' is invalid: {value}"),
            Self::DiscoveryFailed { reason } => {
                format!("Could not locate configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Configuration is loaded with precedence: CLI flags > .dbanalyst/config.toml > defaults"
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec!["Validate the TOML syntax of the config file".to_string()],
            Self::MissingRequired(key) => vec![format!(
                "Set '{key}' in .dbanalyst/config.toml or pass it on the command line"
            )],
            Self::InvalidValue { .. } => {
                vec!["Run `dbanalyst config` to inspect the effective values".to_string()]
            }
            Self::DiscoveryFailed { .. } => {
                vec!["Pass an explicit file with --config <PATH>".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// LLM backend errors
///
/// Every provider maps its failures onto these variants so the completion
/// adapter can treat them uniformly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, undecodable body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Budget limit exceeded
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {duration:?}")
            }
            Self::BudgetExceeded { limit, attempted } => format!(
                "LLM budget exceeded: attempted {attempted} calls, limit is {limit}"
            ),
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) => Some(
                "Transport errors occur when the LLM provider cannot be reached.".to_string(),
            ),
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::ProviderQuota(_) => Some(
                "Quota errors occur when rate limits or usage limits are exceeded.".to_string(),
            ),
            Self::ProviderOutage(_) => {
                Some("Provider outages are temporary service disruptions.".to_string())
            }
            Self::Timeout { .. } => Some(
                "Timeouts occur when a completion takes longer than completion_timeout."
                    .to_string(),
            ),
            Self::BudgetExceeded { .. } => {
                Some("Budget limits prevent excessive LLM API calls and costs.".to_string())
            }
            Self::Misconfiguration(_) | Self::Unsupported(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) | Self::ProviderOutage(_) => vec![
                "Check network connectivity and retry".to_string(),
                "Configure [llm] fallback_provider for resilience".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Export the API key named by api_key_env in [llm.<provider>]".to_string(),
            ],
            Self::ProviderQuota(_) => vec!["Wait before retrying or raise your plan limits".to_string()],
            Self::Timeout { .. } => {
                vec!["Increase [defaults] completion_timeout".to_string()]
            }
            Self::BudgetExceeded { .. } => {
                vec!["Raise [llm.openrouter] budget or DBANALYST_OPENROUTER_BUDGET".to_string()]
            }
            Self::Misconfiguration(_) | Self::Unsupported(_) => vec![
                "Supported providers: anthropic, openrouter".to_string(),
                "Run `dbanalyst config` to inspect the effective LLM settings".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::LlmIntegration
    }
}

/// Errors raised while opening or introspecting the target database
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database file not found: {path}")]
    NotFound { path: String },

    #[error("Failed to open database {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Schema introspection failed: {0}")]
    Introspection(String),
}

impl UserFriendlyError for DatabaseError {
    fn user_message(&self) -> String {
        match self {
            Self::NotFound { path } => format!("No database at '{path}'"),
            Self::Open { reason, .. } => format!("The database could not be opened: {reason}"),
            Self::Introspection(msg) => format!("The database schema could not be read: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some("The database is opened read-only and its schema is described to the model.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        vec![
            "Check [database] path in .dbanalyst/config.toml or pass --db <PATH>".to_string(),
            "Make sure the file is a SQLite database".to_string(),
        ]
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Database
    }
}

/// Classification of a failed query.
///
/// The correction loop branches on this, so backends should pick the most
/// specific kind they can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    /// The statement could not be parsed
    Syntax,
    /// A referenced table, view or column does not exist
    MissingObject,
    /// The statement parsed but failed while running
    Runtime,
    /// The statement exceeded the query timeout
    Timeout,
    /// The statement was refused by the read-only guard
    Rejected,
}

impl QueryErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::MissingObject => "missing_object",
            Self::Runtime => "runtime",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured execution error returned by a query backend
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// The offending statement, where the backend knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl QueryError {
    #[must_use]
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql: None,
        }
    }

    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Syntax, message)
    }

    #[must_use]
    pub fn missing_object(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::MissingObject, message)
    }

    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Runtime, message)
    }

    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        Self::new(
            QueryErrorKind::Timeout,
            format!("query exceeded {duration:?} timeout"),
        )
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Rejected, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let err = AnalystError::Config(ConfigError::MissingRequired("database.path".into()));
        assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);

        let err = AnalystError::Llm(LlmError::Transport("down".into()));
        assert_eq!(err.to_exit_code(), ExitCode::LLM_FAILURE);

        let err = AnalystError::Database(DatabaseError::NotFound {
            path: "x.db".into(),
        });
        assert_eq!(err.to_exit_code(), ExitCode::DATABASE_UNAVAILABLE);

        let err = AnalystError::SessionFailed {
            session_id: "s1".into(),
            reason: "planning".into(),
            message: "no plan".into(),
        };
        assert_eq!(err.to_exit_code(), ExitCode::SESSION_FAILED);

        let err = AnalystError::Interrupted {
            session_id: "s2".into(),
        };
        assert_eq!(err.to_exit_code(), ExitCode::INTERRUPTED);
        assert!(err.display_for_user().contains("Session id: s2"));
    }

    #[test]
    fn test_display_for_user_includes_suggestions() {
        let err = AnalystError::Llm(LlmError::ProviderAuth("401".into()));
        let text = err.display_for_user();
        assert!(text.contains("authentication failed"));
        assert!(text.contains("Suggestions:"));
        assert!(text.contains("api_key_env"));
    }

    #[test]
    fn test_query_error_kind_wire_names() {
        let json = serde_json::to_string(&QueryErrorKind::MissingObject).unwrap();
        assert_eq!(json, r#""missing_object""#);
        assert_eq!(QueryErrorKind::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_query_error_display() {
        let err = QueryError::missing_object("no such column: emial").with_sql("SELECT emial FROM user");
        assert_eq!(err.to_string(), "missing_object error: no such column: emial");
        assert_eq!(err.sql.as_deref(), Some("SELECT emial FROM user"));
    }

    #[test]
    fn test_query_timeout_message_keeps_subsecond_precision() {
        let err = QueryError::timeout(Duration::from_millis(30));
        assert_eq!(err.kind, QueryErrorKind::Timeout);
        assert_eq!(err.message, "query exceeded 30ms timeout");
        assert_eq!(
            QueryError::timeout(Duration::from_secs(2)).message,
            "query exceeded 2s timeout"
        );
    }
}
