//! Session events and their wire shape
//!
//! Every event serializes as
//! `{"sequence": n, "timestamp": "...", "type": "...", "payload": {...}}`.
//! Sequence numbers are assigned by [`EventEmitter`] and start at 0.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dbanalyst_query::{QueryErrorKind, Record};

use crate::state::{AttemptMode, FailureReason, StepStatus};

/// Source of event timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One entry of a session's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: EventBody,
}

impl StreamEvent {
    /// `type` field of the wire shape
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.body.event_type()
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.body.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    PlanProduced {
        sub_goals: Vec<String>,
    },
    SqlGenerated {
        step: usize,
        attempt: u32,
        mode: AttemptMode,
        sql: String,
    },
    SqlExecuted(ExecutionReport),
    CorrectionAttempted {
        step: usize,
        /// The attempt about to be made
        attempt: u32,
        kind: String,
        error: String,
    },
    StepCompleted {
        step: usize,
        description: String,
        status: StepStatus,
        attempts: u32,
    },
    AnswerSynthesized {
        answer: String,
    },
    SessionFailed {
        reason: FailureReason,
        message: String,
    },
}

impl EventBody {
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PlanProduced { .. } => "plan_produced",
            Self::SqlGenerated { .. } => "sql_generated",
            Self::SqlExecuted(_) => "sql_executed",
            Self::CorrectionAttempted { .. } => "correction_attempted",
            Self::StepCompleted { .. } => "step_completed",
            Self::AnswerSynthesized { .. } => "answer_synthesized",
            Self::SessionFailed { .. } => "session_failed",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AnswerSynthesized { .. } | Self::SessionFailed { .. }
        )
    }
}

/// Payload of `sql_executed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub step: usize,
    pub attempt: u32,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success {
        row_count: usize,
        columns: Vec<String>,
        /// Leading rows only
        rows: Vec<Record>,
        /// The backend hit its row limit, so `row_count` is a lower bound
        #[serde(default)]
        truncated: bool,
    },
    Error {
        kind: QueryErrorKind,
        /// Redacted
        message: String,
    },
}

impl ExecutionOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Assigns sequence numbers and timestamps
pub struct EventEmitter {
    next_sequence: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            next_sequence: 0,
            clock,
        }
    }

    pub fn emit(&mut self, body: EventBody) -> StreamEvent {
        let event = StreamEvent {
            sequence: self.next_sequence,
            timestamp: self.clock.now(),
            body,
        };
        self.next_sequence += 1;
        event
    }

    /// Number of events emitted so far
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.next_sequence
    }
}

/// JSON value of an event, for NDJSON output
///
/// # Errors
///
/// Returns an error if the event cannot be serialized.
pub fn to_json_line(event: &StreamEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Payload of an event as a plain JSON value
#[must_use]
pub fn payload_of(event: &StreamEvent) -> Value {
    serde_json::to_value(&event.body)
        .ok()
        .and_then(|mut v| v.get_mut("payload").map(Value::take))
        .unwrap_or(Value::Null)
}
