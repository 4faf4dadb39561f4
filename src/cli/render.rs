//! Human-readable rendering of session events

use std::fmt::Write;

use dbanalyst_engine::{EventBody, ExecutionOutcome, StreamEvent};
use dbanalyst_engine::state::StepStatus;

/// Render one event as one or more terminal lines
#[must_use]
pub fn render_event(event: &StreamEvent) -> String {
    match &event.body {
        EventBody::PlanProduced { sub_goals } => {
            let mut out = String::from("Plan:");
            for (i, goal) in sub_goals.iter().enumerate() {
                let _ = write!(out, "\n  {}. {goal}", i + 1);
            }
            out
        }
        EventBody::SqlGenerated {
            step,
            attempt,
            mode,
            sql,
        } => format!(
            "→ Step {} attempt {attempt} ({mode}):\n    {}",
            step + 1,
            sql.replace('\n', "\n    ")
        ),
        EventBody::SqlExecuted(report) => match &report.outcome {
            ExecutionOutcome::Success {
                row_count,
                truncated,
                ..
            } => {
                let noun = if *row_count == 1 { "row" } else { "rows" };
                if *truncated {
                    format!("  ✓ {row_count} {noun} (row limit reached, more rows matched)")
                } else {
                    format!("  ✓ {row_count} {noun}")
                }
            }
            ExecutionOutcome::Error { kind, message } => format!("  ✗ {kind}: {message}"),
        },
        EventBody::CorrectionAttempted {
            attempt, kind, ..
        } => format!("  ↻ Retrying (attempt {attempt}) after {kind} error"),
        EventBody::StepCompleted {
            step,
            description,
            status,
            attempts,
        } => {
            let mark = match status {
                StepStatus::Succeeded => "✓",
                StepStatus::Exhausted => "✗",
            };
            format!(
                "{mark} Step {} {} after {attempts} attempt(s): {description}",
                step + 1,
                status.as_str()
            )
        }
        EventBody::AnswerSynthesized { answer } => format!("\n{answer}"),
        EventBody::SessionFailed { reason, message } => {
            format!("✗ Session failed ({reason}): {message}")
        }
    }
}
