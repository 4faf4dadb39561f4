//! Logging setup for dbanalyst
//!
//! Logs always go to stderr so that NDJSON written to stdout stays parseable.

use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use dbanalyst_error_redaction::redact_error_message_for_logging;

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `dbanalyst=info,warn`, or
/// `dbanalyst=debug,info` in verbose mode. Verbose mode also prints targets and
/// span close events (with their duration).
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("dbanalyst=debug,info")
            } else {
                EnvFilter::try_new("dbanalyst=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one analysis session
pub fn session_span(session_id: &str) -> tracing::Span {
    span!(Level::INFO, "session", session_id = %session_id)
}

/// Log the start of a session. The question itself is only logged at debug.
pub fn log_session_start(session_id: &str, question_chars: usize) {
    info!(session_id = %session_id, question_chars, "Starting analysis session");
}

/// Log a fatal session failure with a redacted message
pub fn log_session_failure(session_id: &str, reason: &str, message: &str) {
    let sanitized = redact_error_message_for_logging(message);
    error!(
        session_id = %session_id,
        reason = %reason,
        error = %sanitized,
        "Session failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_is_constructible_without_subscriber() {
        let span = session_span("abc");
        let _entered = span.enter();
        log_session_start("abc", 12);
        log_session_failure("abc", "planning", "token=secret123 rejected");
    }
}
