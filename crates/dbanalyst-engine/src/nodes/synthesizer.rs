use serde_json::Value;
use tracing::{info, warn};

use dbanalyst_prompt_template::render_synthesize;

use super::NodeContext;
use crate::completion::{Completion, CompletionRequest};
use crate::event::EventBody;
use crate::machine::NodeOutcome;
use crate::state::RunState;

/// Answer given when no sub-goal produced data
pub const NO_DATA_ANSWER: &str = "Sorry, no data could be collected for your question. \
Try rephrasing it, or check the logs for the failed queries.";

/// Turn the completed steps into the final answer
pub async fn synthesize(
    state: &mut RunState,
    ctx: NodeContext<'_>,
    events: &mut Vec<EventBody>,
) -> NodeOutcome {
    let answer = if state.succeeded_steps() == 0 {
        warn!("No sub-goal produced data, answering without the model");
        NO_DATA_ANSWER.to_string()
    } else {
        let results: Vec<Value> = state
            .completed
            .iter()
            .map(|s| s.context_json(ctx.policy.max_context_rows))
            .collect();
        let results_json =
            serde_json::to_string_pretty(&results).unwrap_or_else(|_| "[]".to_string());
        let prompt = render_synthesize(&state.question, &results_json);

        match ctx
            .complete(CompletionRequest::new(state.session_id.as_str(), prompt))
            .await
        {
            Ok(Completion::Answer(text)) => text,
            Ok(other) => {
                return NodeOutcome::SynthesisFailed {
                    message: format!("expected an answer, got {other:?}"),
                };
            }
            Err(e) => {
                return NodeOutcome::SynthesisFailed {
                    message: e.to_string(),
                };
            }
        }
    };

    info!(answer_chars = answer.len(), "Answer synthesized");
    state.answer = Some(answer.clone());
    events.push(EventBody::AnswerSynthesized { answer });
    NodeOutcome::Synthesized
}
