use tracing::info;

use crate::event::EventBody;
use crate::machine::NodeOutcome;
use crate::state::RunState;

/// Announce the next attempt of a sub-goal whose last attempt failed
pub fn correct(
    state: &RunState,
    events: &mut Vec<EventBody>,
    step: usize,
    next_attempt: u32,
) -> NodeOutcome {
    let (kind, error) = state
        .last_attempt()
        .and_then(|a| a.failure())
        .map_or(("unknown", String::new()), |f| (f.kind(), f.message().to_string()));

    info!(step, next_attempt, kind, "Retrying sub-goal");
    events.push(EventBody::CorrectionAttempted {
        step,
        attempt: next_attempt,
        kind: kind.to_string(),
        error,
    });

    NodeOutcome::Corrected {
        has_failed_sql: state.last_failed_sql().is_some(),
    }
}
