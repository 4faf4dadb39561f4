use tracing::{info, warn};

use dbanalyst_error_redaction::redact_error_message;
use dbanalyst_query::QueryError;

use super::NodeContext;
use crate::event::{EventBody, ExecutionOutcome, ExecutionReport};
use crate::machine::NodeOutcome;
use crate::state::{AttemptFailure, AttemptOutcome, RunState};

/// Run the SQL of the latest attempt as-is
pub async fn execute(
    state: &mut RunState,
    ctx: NodeContext<'_>,
    events: &mut Vec<EventBody>,
    step: usize,
    attempt: u32,
) -> NodeOutcome {
    let sql = state.last_attempt().and_then(|a| a.sql.clone());

    let result = match &sql {
        Some(sql) => {
            let timeout = ctx.policy.query_timeout;
            match tokio::time::timeout(timeout, ctx.query.execute(sql)).await {
                Ok(result) => result,
                Err(_) => Err(QueryError::timeout(timeout).with_sql(sql.as_str())),
            }
        }
        None => Err(QueryError::runtime("no SQL to execute")),
    };

    match result {
        Ok(rows) => {
            info!(
                step,
                attempt,
                row_count = rows.row_count(),
                truncated = rows.truncated,
                "Query succeeded"
            );
            events.push(EventBody::SqlExecuted(ExecutionReport {
                step,
                attempt,
                outcome: ExecutionOutcome::Success {
                    row_count: rows.row_count(),
                    columns: rows.columns.clone(),
                    rows: rows
                        .rows
                        .iter()
                        .take(ctx.policy.max_context_rows)
                        .cloned()
                        .collect(),
                    truncated: rows.truncated,
                },
            }));
            if let Some(last) = state.last_attempt_mut() {
                last.outcome = AttemptOutcome::Success { rows };
            }
            NodeOutcome::Executed
        }
        Err(mut error) => {
            error.message = redact_error_message(&error.message);
            warn!(step, attempt, kind = %error.kind, error = %error.message, "Query failed");
            events.push(EventBody::SqlExecuted(ExecutionReport {
                step,
                attempt,
                outcome: ExecutionOutcome::Error {
                    kind: error.kind,
                    message: error.message.clone(),
                },
            }));
            let message = error.to_string();
            if let Some(last) = state.last_attempt_mut() {
                last.outcome = AttemptOutcome::Error {
                    failure: AttemptFailure::Execution { error },
                };
            }
            NodeOutcome::ExecutionFailed { message }
        }
    }
}
