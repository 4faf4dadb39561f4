//! Run state of one session
//!
//! [`RunState`] is owned by the session task and handed to each node by
//! exclusive reference. Attempts of the sub-goal in progress live in
//! `attempts`; when the sub-goal finishes they are folded into one
//! [`CompletedStep`] and the list is cleared.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use dbanalyst_query::{QueryError, QueryRows};

/// Marker handed to synthesis for a sub-goal that produced no data
pub const UNDETERMINED_MARKER: &str = "could not be determined";

/// Whether an attempt writes fresh SQL or repairs a failed statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptMode {
    Initial,
    Correction,
}

impl AttemptMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Correction => "correction",
        }
    }
}

impl std::fmt::Display for AttemptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The model did not produce usable SQL
    Generation { message: String },
    /// The statement failed to execute
    Execution { error: QueryError },
}

impl AttemptFailure {
    /// Short kind label used in events: `generation` or the query error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation { .. } => "generation",
            Self::Execution { error } => error.kind.as_str(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Generation { message } => message,
            Self::Execution { error } => &error.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Success { rows: QueryRows },
    Error { failure: AttemptFailure },
}

/// One try at the current sub-goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAttempt {
    /// 1-based
    pub attempt: u32,
    pub mode: AttemptMode,
    /// Absent when generation failed
    pub sql: Option<String>,
    pub outcome: AttemptOutcome,
}

impl StepAttempt {
    #[must_use]
    pub fn failure(&self) -> Option<&AttemptFailure> {
        match &self.outcome {
            AttemptOutcome::Error { failure } => Some(failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Exhausted,
}

impl StepStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Summary of a finished sub-goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step: usize,
    pub description: String,
    pub status: StepStatus,
    pub attempts: u32,
    /// SQL of the last attempt that produced any
    pub sql: Option<String>,
    /// Rows of the successful attempt
    pub rows: Option<QueryRows>,
    /// Last error of an exhausted sub-goal
    pub error: Option<String>,
}

impl CompletedStep {
    /// JSON view handed to later prompts, rows capped at `max_rows`
    #[must_use]
    pub fn context_json(&self, max_rows: usize) -> Value {
        match &self.rows {
            Some(rows) if self.status == StepStatus::Succeeded => {
                let shown: Vec<Value> = rows
                    .rows
                    .iter()
                    .take(max_rows)
                    .map(|r| Value::Object(r.clone()))
                    .collect();
                let mut value = json!({
                    "step": self.description,
                    "sql": self.sql,
                    "row_count": rows.row_count(),
                    "rows": shown,
                });
                if rows.truncated || rows.row_count() > max_rows {
                    value["truncated"] = Value::Bool(true);
                }
                value
            }
            _ => json!({
                "step": self.description,
                "result": UNDETERMINED_MARKER,
            }),
        }
    }
}

/// Why a session ended without an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidQuestion,
    Planning,
    SubGoalExhausted,
    Synthesis,
}

impl FailureReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidQuestion => "invalid_question",
            Self::Planning => "planning",
            Self::SubGoalExhausted => "sub_goal_exhausted",
            Self::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub reason: FailureReason,
    pub message: String,
}

/// Aggregate state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub session_id: String,
    pub question: String,
    pub plan: Vec<String>,
    /// Index of the sub-goal in progress
    pub current_step: usize,
    /// Attempts of the current sub-goal only
    pub attempts: Vec<StepAttempt>,
    pub completed: Vec<CompletedStep>,
    pub answer: Option<String>,
    pub failure: Option<SessionFailure>,
    /// Set when the consumer went away before a terminal event
    pub cancelled: bool,
    version: u64,
}

impl RunState {
    #[must_use]
    pub fn new(session_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            question: question.into(),
            plan: Vec::new(),
            current_step: 0,
            attempts: Vec::new(),
            completed: Vec::new(),
            answer: None,
            failure: None,
            cancelled: false,
            version: 0,
        }
    }

    /// Transition counter
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    #[must_use]
    pub fn current_sub_goal(&self) -> Option<&str> {
        self.plan.get(self.current_step).map(String::as_str)
    }

    #[must_use]
    pub fn last_attempt(&self) -> Option<&StepAttempt> {
        self.attempts.last()
    }

    pub(crate) fn last_attempt_mut(&mut self) -> Option<&mut StepAttempt> {
        self.attempts.last_mut()
    }

    /// Most recent attempt of this sub-goal that produced SQL and failed
    #[must_use]
    pub fn last_failed_sql(&self) -> Option<(&str, &AttemptFailure)> {
        self.attempts.iter().rev().find_map(|a| match (&a.sql, a.failure()) {
            (Some(sql), Some(failure)) => Some((sql.as_str(), failure)),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.answer.is_some() || self.failure.is_some()
    }

    #[must_use]
    pub fn succeeded_steps(&self) -> usize {
        self.completed
            .iter()
            .filter(|s| s.status == StepStatus::Succeeded)
            .count()
    }

    /// Fold the attempts of the current sub-goal into a [`CompletedStep`] and
    /// move to the next one.
    pub(crate) fn finish_step(&mut self, status: StepStatus) -> &CompletedStep {
        let attempts = std::mem::take(&mut self.attempts);
        let sql = attempts.iter().rev().find_map(|a| a.sql.clone());
        let last = attempts.last();
        let rows = last.and_then(|a| match &a.outcome {
            AttemptOutcome::Success { rows } => Some(rows.clone()),
            _ => None,
        });
        let error = last
            .and_then(StepAttempt::failure)
            .map(|f| f.message().to_string());

        self.completed.push(CompletedStep {
            step: self.current_step,
            description: self.current_sub_goal().unwrap_or_default().to_string(),
            status,
            attempts: u32::try_from(attempts.len()).unwrap_or(u32::MAX),
            sql,
            rows,
            error,
        });
        self.current_step += 1;
        &self.completed[self.completed.len() - 1]
    }

    /// Completed steps as a JSON array for generation prompts
    #[must_use]
    pub fn prior_results_json(&self, max_rows: usize) -> String {
        let values: Vec<Value> = self
            .completed
            .iter()
            .map(|s| s.context_json(max_rows))
            .collect();
        serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbanalyst_query::Record;

    fn rows(n: usize) -> QueryRows {
        QueryRows {
            columns: vec!["id".to_string()],
            rows: (0..n)
                .map(|i| {
                    let mut r = Record::new();
                    r.insert("id".to_string(), Value::from(i));
                    r
                })
                .collect(),
            truncated: false,
        }
    }

    fn state_with_plan() -> RunState {
        let mut state = RunState::new("s-1", "how many users?");
        state.plan = vec!["count users".to_string(), "count orders".to_string()];
        state
    }

    #[test]
    fn test_finish_step_folds_attempts() {
        let mut state = state_with_plan();
        state.attempts.push(StepAttempt {
            attempt: 1,
            mode: AttemptMode::Initial,
            sql: Some("SELECT COUNT(*) FROM users".to_string()),
            outcome: AttemptOutcome::Error {
                failure: AttemptFailure::Execution {
                    error: QueryError::missing_object("no such table: users"),
                },
            },
        });
        state.attempts.push(StepAttempt {
            attempt: 2,
            mode: AttemptMode::Correction,
            sql: Some("SELECT COUNT(*) FROM user".to_string()),
            outcome: AttemptOutcome::Success { rows: rows(1) },
        });

        let step = state.finish_step(StepStatus::Succeeded).clone();
        assert_eq!(step.step, 0);
        assert_eq!(step.attempts, 2);
        assert_eq!(step.sql.as_deref(), Some("SELECT COUNT(*) FROM user"));
        assert!(step.rows.is_some());
        assert!(step.error.is_none());
        assert!(state.attempts.is_empty());
        assert_eq!(state.current_step, 1);
        assert_eq!(state.current_sub_goal(), Some("count orders"));
    }

    #[test]
    fn test_exhausted_step_keeps_last_error_and_sql() {
        let mut state = state_with_plan();
        state.attempts.push(StepAttempt {
            attempt: 1,
            mode: AttemptMode::Initial,
            sql: Some("SELECT nope FROM user".to_string()),
            outcome: AttemptOutcome::Error {
                failure: AttemptFailure::Execution {
                    error: QueryError::missing_object("no such column: nope"),
                },
            },
        });
        state.attempts.push(StepAttempt {
            attempt: 2,
            mode: AttemptMode::Correction,
            sql: None,
            outcome: AttemptOutcome::Error {
                failure: AttemptFailure::Generation {
                    message: "model unavailable".to_string(),
                },
            },
        });

        let step = state.finish_step(StepStatus::Exhausted).clone();
        assert_eq!(step.sql.as_deref(), Some("SELECT nope FROM user"));
        assert_eq!(step.error.as_deref(), Some("model unavailable"));
        assert_eq!(
            step.context_json(10)["result"],
            Value::from(UNDETERMINED_MARKER)
        );
    }

    #[test]
    fn test_last_failed_sql_skips_generation_failures() {
        let mut state = state_with_plan();
        state.attempts.push(StepAttempt {
            attempt: 1,
            mode: AttemptMode::Initial,
            sql: Some("SELECT x".to_string()),
            outcome: AttemptOutcome::Error {
                failure: AttemptFailure::Execution {
                    error: QueryError::syntax("bad"),
                },
            },
        });
        state.attempts.push(StepAttempt {
            attempt: 2,
            mode: AttemptMode::Correction,
            sql: None,
            outcome: AttemptOutcome::Error {
                failure: AttemptFailure::Generation {
                    message: "timeout".to_string(),
                },
            },
        });
        let (sql, failure) = state.last_failed_sql().unwrap();
        assert_eq!(sql, "SELECT x");
        assert_eq!(failure.kind(), "syntax");
    }

    #[test]
    fn test_context_json_truncates_rows() {
        let step = CompletedStep {
            step: 0,
            description: "list ids".to_string(),
            status: StepStatus::Succeeded,
            attempts: 1,
            sql: Some("SELECT id FROM t".to_string()),
            rows: Some(rows(10)),
            error: None,
        };
        let value = step.context_json(3);
        assert_eq!(value["rows"].as_array().unwrap().len(), 3);
        assert_eq!(value["row_count"], Value::from(10));
        assert_eq!(value["truncated"], Value::Bool(true));
    }

    #[test]
    fn test_context_json_flags_backend_row_limit() {
        let mut limited = rows(2);
        limited.truncated = true;
        let step = CompletedStep {
            step: 0,
            description: "list ids".to_string(),
            status: StepStatus::Succeeded,
            attempts: 1,
            sql: Some("SELECT id FROM t".to_string()),
            rows: Some(limited),
            error: None,
        };
        let value = step.context_json(50);
        assert_eq!(value["rows"].as_array().unwrap().len(), 2);
        assert_eq!(value["truncated"], Value::Bool(true));

        let complete = CompletedStep {
            rows: Some(rows(2)),
            ..step
        };
        assert!(complete.context_json(50).get("truncated").is_none());
    }
}
