use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use dbanalyst_error_redaction::redact_error_message;
use dbanalyst_prompt_template::{render_correct_sql, render_generate_sql};

use super::NodeContext;
use crate::completion::{Completion, CompletionRequest};
use crate::event::EventBody;
use crate::machine::NodeOutcome;
use crate::state::{AttemptFailure, AttemptMode, AttemptOutcome, RunState, StepAttempt};

static SQL_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z]+[ \t]*\r?\n|[ \t]*\r?\n?)(.*?)```").expect("valid regex")
});

/// Strip code fences and one trailing `;`
#[must_use]
pub fn normalize_sql(text: &str) -> String {
    let body = SQL_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str());
    let trimmed = body.trim();
    trimmed
        .strip_suffix(';')
        .unwrap_or(trimmed)
        .trim_end()
        .to_string()
}

/// Write SQL for the current sub-goal
///
/// In correction mode the prompt carries the most recent failed statement and
/// its error.
pub async fn generate_sql(
    state: &mut RunState,
    ctx: NodeContext<'_>,
    events: &mut Vec<EventBody>,
    step: usize,
    attempt: u32,
    mode: AttemptMode,
) -> NodeOutcome {
    let sub_goal = state.current_sub_goal().unwrap_or_default().to_string();
    let prior = state.prior_results_json(ctx.policy.max_context_rows);

    let prompt = match (mode, state.last_failed_sql()) {
        (AttemptMode::Correction, Some((failed_sql, failure))) => render_correct_sql(
            &state.question,
            ctx.schema,
            &sub_goal,
            &prior,
            failed_sql,
            &format!("{}: {}", failure.kind(), failure.message()),
        ),
        _ => render_generate_sql(&state.question, ctx.schema, &sub_goal, &prior),
    };
    let request = CompletionRequest::new(state.session_id.as_str(), prompt);

    let generated = match ctx.complete(request).await {
        Ok(Completion::Sql(text)) => {
            let sql = normalize_sql(&text);
            if sql.is_empty() {
                Err("model returned no SQL".to_string())
            } else {
                Ok(sql)
            }
        }
        Ok(other) => Err(format!("expected SQL, got {other:?}")),
        Err(e) => Err(e.to_string()),
    };

    match generated {
        Ok(sql) => {
            debug!(step, attempt, mode = %mode, sql = %sql, "SQL generated");
            state.attempts.push(StepAttempt {
                attempt,
                mode,
                sql: Some(sql.clone()),
                outcome: AttemptOutcome::Pending,
            });
            events.push(EventBody::SqlGenerated {
                step,
                attempt,
                mode,
                sql,
            });
            NodeOutcome::Generated
        }
        Err(message) => {
            let message = redact_error_message(&message);
            warn!(step, attempt, error = %message, "SQL generation failed");
            state.attempts.push(StepAttempt {
                attempt,
                mode,
                sql: None,
                outcome: AttemptOutcome::Error {
                    failure: AttemptFailure::Generation {
                        message: message.clone(),
                    },
                },
            });
            NodeOutcome::GenerationFailed { message }
        }
    }
}
