//! Command implementations

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use dbanalyst_config::Config;
use dbanalyst_engine::{EventBody, Orchestrator, StreamEvent};
use dbanalyst_query::QueryBackend;
use dbanalyst_utils::error::AnalystError;

use super::render::render_event;
use crate::setup::{build_orchestrator, open_database};

const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// One session; fails with `SessionFailed` when the session does
pub async fn ask(config: &Config, question: &str, ndjson: bool) -> Result<(), AnalystError> {
    let orchestrator = build_orchestrator(config).await?;
    let (session_id, terminal) = stream_session(&orchestrator, question, ndjson).await?;

    match terminal {
        Some(StreamEvent {
            body: EventBody::SessionFailed { reason, message },
            ..
        }) => Err(AnalystError::SessionFailed {
            session_id,
            reason: reason.to_string(),
            message,
        }),
        _ => Ok(()),
    }
}

/// Interactive loop over stdin
pub async fn chat(config: &Config) -> Result<(), AnalystError> {
    let orchestrator = build_orchestrator(config).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask a question about the database (quit, exit or q to leave).");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if QUIT_WORDS.contains(&question.to_lowercase().as_str()) {
            break;
        }
        let (session_id, terminal) = stream_session(&orchestrator, question, false).await?;
        debug!(
            session_id = %session_id,
            terminal = terminal.as_ref().map(StreamEvent::event_type),
            "Session finished"
        );
        println!();
    }
    Ok(())
}

/// Print the schema description
pub async fn schema(config: &Config) -> Result<(), AnalystError> {
    let database = open_database(config)?;
    let description = database.describe_schema().await?;
    println!("{description}");
    Ok(())
}

/// Print effective configuration with sources
pub fn show_config(config: &Config) {
    println!("Effective configuration:");
    for (key, (value, source)) in config.effective_config() {
        println!("  {key} = {value}  ({source})");
    }
}

/// Print every event of one session; returns its id and terminal event.
///
/// Ctrl-C cancels the session and returns `Interrupted`.
async fn stream_session(
    orchestrator: &Orchestrator,
    question: &str,
    ndjson: bool,
) -> Result<(String, Option<StreamEvent>), AnalystError> {
    stream_session_until(orchestrator, question, ndjson, tokio::signal::ctrl_c()).await
}

/// [`stream_session`] cancelled when `interrupt` completes
pub(super) async fn stream_session_until<F: Future>(
    orchestrator: &Orchestrator,
    question: &str,
    ndjson: bool,
    interrupt: F,
) -> Result<(String, Option<StreamEvent>), AnalystError> {
    let mut stream = orchestrator.start_session(question);
    let session_id = stream.session_id().to_string();
    let mut last = None;
    tokio::pin!(interrupt);

    loop {
        let event = tokio::select! {
            event = stream.next() => event,
            _ = &mut interrupt => {
                warn!(session_id = stream.session_id(), "Interrupted, cancelling session");
                stream.cancel();
                return Err(AnalystError::Interrupted { session_id });
            }
        };
        let Some(event) = event else { break };

        if ndjson {
            let line = serde_json::to_string(&event)
                .context("Failed to serialize event")
                .map_err(|e| AnalystError::Io(std::io::Error::other(e)))?;
            println!("{line}");
        } else {
            println!("{}", render_event(&event));
        }
        last = Some(event);
    }

    Ok((session_id, last.filter(StreamEvent::is_terminal)))
}
