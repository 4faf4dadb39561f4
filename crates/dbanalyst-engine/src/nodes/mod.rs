//! Step nodes
//!
//! Each node reads and updates the [`RunState`], pushes the events it
//! produced onto `events` and reports a [`NodeOutcome`]. Nodes never fail:
//! errors become outcomes and data in the run state.

mod corrector;
mod executor;
mod planner;
mod sql_generator;
mod synthesizer;

pub use corrector::correct;
pub use executor::execute;
pub use planner::plan;
pub use sql_generator::{generate_sql, normalize_sql};
pub use synthesizer::{NO_DATA_ANSWER, synthesize};

use dbanalyst_query::QueryBackend;

use crate::completion::{Completion, CompletionCapability, CompletionError, CompletionRequest};
use crate::event::EventBody;
use crate::machine::NodeOutcome;
use crate::policy::SessionPolicy;
use crate::state::{RunState, StepStatus};

/// Capabilities and limits shared by all nodes of a session
#[derive(Clone, Copy)]
pub struct NodeContext<'a> {
    pub completion: &'a dyn CompletionCapability,
    pub query: &'a dyn QueryBackend,
    pub schema: &'a str,
    pub policy: &'a SessionPolicy,
}

impl NodeContext<'_> {
    /// Completion call bounded by the completion timeout
    pub(crate) async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Completion, CompletionError> {
        let timeout = self.policy.completion_timeout;
        match tokio::time::timeout(timeout, self.completion.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Unavailable(format!(
                "completion timed out after {timeout:?}"
            ))),
        }
    }
}

/// Close the current sub-goal with `status`
pub fn record_step(
    state: &mut RunState,
    status: StepStatus,
    events: &mut Vec<EventBody>,
) -> NodeOutcome {
    let step = state.finish_step(status);
    events.push(EventBody::StepCompleted {
        step: step.step,
        description: step.description.clone(),
        status: step.status,
        attempts: step.attempts,
    });
    NodeOutcome::StepRecorded
}
