use tracing::{info, warn};

use dbanalyst_prompt_template::render_plan;

use super::NodeContext;
use crate::completion::{Completion, CompletionRequest};
use crate::event::EventBody;
use crate::machine::NodeOutcome;
use crate::state::RunState;

/// Ask for the ordered sub-goals of the question
pub async fn plan(
    state: &mut RunState,
    ctx: NodeContext<'_>,
    events: &mut Vec<EventBody>,
) -> NodeOutcome {
    let max_steps = ctx.policy.max_plan_steps;
    let prompt = render_plan(&state.question, ctx.schema, max_steps);
    let request = CompletionRequest::new(state.session_id.as_str(), prompt);

    let sub_goals = match ctx.complete(request).await {
        Ok(Completion::Plan(goals)) => goals,
        Ok(other) => {
            return NodeOutcome::PlanningFailed {
                message: format!("expected a plan, got {other:?}"),
            };
        }
        Err(e) => {
            return NodeOutcome::PlanningFailed {
                message: e.to_string(),
            };
        }
    };

    let mut sub_goals: Vec<String> = sub_goals
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();
    if sub_goals.is_empty() {
        return NodeOutcome::PlanningFailed {
            message: "planner returned an empty plan".to_string(),
        };
    }
    if sub_goals.len() > max_steps {
        warn!(
            planned = sub_goals.len(),
            max_steps, "Plan longer than allowed, truncating"
        );
        sub_goals.truncate(max_steps);
    }

    info!(steps = sub_goals.len(), "Plan produced");
    state.plan.clone_from(&sub_goals);
    events.push(EventBody::PlanProduced { sub_goals });
    NodeOutcome::Planned {
        steps: state.plan.len(),
    }
}
