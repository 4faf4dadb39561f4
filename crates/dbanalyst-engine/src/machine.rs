//! Session state machine
//!
//! [`Stage`] names what the session does next. Nodes report a
//! [`NodeOutcome`] and [`transition`] picks the following stage; it has no
//! side effects so every edge can be tested on its own.
//!
//! Per sub-goal the loop is
//! `Generating -> Executing -> {StepSucceeded | Correcting -> Generating}`
//! and ends in `StepSucceeded` or `StepExhausted`.

use dbanalyst_config::OnExhausted;
use thiserror::Error;

use crate::policy::SessionPolicy;
use crate::state::{AttemptMode, FailureReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planning,
    Generating {
        step: usize,
        attempt: u32,
        mode: AttemptMode,
    },
    Executing {
        step: usize,
        attempt: u32,
    },
    /// A failed attempt is being reported before `next_attempt` starts
    Correcting {
        step: usize,
        next_attempt: u32,
    },
    StepSucceeded {
        step: usize,
    },
    StepExhausted {
        step: usize,
    },
    Synthesizing,
    Done,
    Failed(FailureReason),
}

impl Stage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Reason reported if this stage cannot continue
    #[must_use]
    pub fn failure_reason(self) -> FailureReason {
        match self {
            Self::Planning => FailureReason::Planning,
            Self::Synthesizing | Self::Done => FailureReason::Synthesis,
            Self::Failed(reason) => reason,
            _ => FailureReason::SubGoalExhausted,
        }
    }
}

/// What a node reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Planned { steps: usize },
    PlanningFailed { message: String },
    Generated,
    GenerationFailed { message: String },
    Executed,
    ExecutionFailed { message: String },
    /// `has_failed_sql` selects correction mode for the next attempt
    Corrected { has_failed_sql: bool },
    StepRecorded,
    Synthesized,
    SynthesisFailed { message: String },
}

impl NodeOutcome {
    /// Error text carried by failure outcomes
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::PlanningFailed { message }
            | Self::GenerationFailed { message }
            | Self::ExecutionFailed { message }
            | Self::SynthesisFailed { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no transition from {stage:?} on {outcome:?}")]
pub struct IllegalTransition {
    pub stage: Stage,
    pub outcome: NodeOutcome,
}

/// Facts about the run that edges depend on
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub policy: &'a SessionPolicy,
    pub plan_len: usize,
}

/// Next stage after `stage` reported `outcome`
///
/// # Errors
///
/// Returns [`IllegalTransition`] when `outcome` cannot come out of `stage`.
pub fn transition(
    stage: Stage,
    outcome: NodeOutcome,
    ctx: TransitionContext<'_>,
) -> Result<Stage, IllegalTransition> {
    next_stage(stage, &outcome, ctx).ok_or(IllegalTransition { stage, outcome })
}

fn next_stage(stage: Stage, outcome: &NodeOutcome, ctx: TransitionContext<'_>) -> Option<Stage> {
    let next = match (stage, outcome) {
        (Stage::Planning, NodeOutcome::Planned { steps }) if *steps > 0 => Stage::Generating {
            step: 0,
            attempt: 1,
            mode: AttemptMode::Initial,
        },
        (Stage::Planning, NodeOutcome::PlanningFailed { .. }) => {
            Stage::Failed(FailureReason::Planning)
        }

        (Stage::Generating { step, attempt, .. }, NodeOutcome::Generated) => {
            Stage::Executing { step, attempt }
        }
        (Stage::Generating { step, attempt, .. }, NodeOutcome::GenerationFailed { .. })
        | (Stage::Executing { step, attempt }, NodeOutcome::ExecutionFailed { .. }) => {
            after_failed_attempt(step, attempt, ctx.policy)
        }
        (Stage::Executing { step, .. }, NodeOutcome::Executed) => Stage::StepSucceeded { step },

        (
            Stage::Correcting { step, next_attempt },
            NodeOutcome::Corrected { has_failed_sql },
        ) => Stage::Generating {
            step,
            attempt: next_attempt,
            mode: if *has_failed_sql {
                AttemptMode::Correction
            } else {
                AttemptMode::Initial
            },
        },

        (Stage::StepSucceeded { step }, NodeOutcome::StepRecorded) => {
            next_step(step, ctx.plan_len)
        }
        (Stage::StepExhausted { step }, NodeOutcome::StepRecorded) => {
            match ctx.policy.on_exhausted {
                OnExhausted::Abort => Stage::Failed(FailureReason::SubGoalExhausted),
                OnExhausted::Continue => next_step(step, ctx.plan_len),
            }
        }

        (Stage::Synthesizing, NodeOutcome::Synthesized) => Stage::Done,
        (Stage::Synthesizing, NodeOutcome::SynthesisFailed { .. }) => {
            Stage::Failed(FailureReason::Synthesis)
        }

        _ => return None,
    };
    Some(next)
}

fn after_failed_attempt(step: usize, attempt: u32, policy: &SessionPolicy) -> Stage {
    if attempt < policy.max_attempts {
        Stage::Correcting {
            step,
            next_attempt: attempt + 1,
        }
    } else {
        Stage::StepExhausted { step }
    }
}

fn next_step(step: usize, plan_len: usize) -> Stage {
    if step + 1 < plan_len {
        Stage::Generating {
            step: step + 1,
            attempt: 1,
            mode: AttemptMode::Initial,
        }
    } else {
        Stage::Synthesizing
    }
}
