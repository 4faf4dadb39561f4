//! Session orchestrator
//!
//! [`Orchestrator`] owns the capabilities and the policy. Each session runs as
//! its own task, drives one [`RunState`] through the nodes following
//! [`transition`](crate::machine::transition) and publishes every event in
//! order. The stream always ends with `answer_synthesized` or
//! `session_failed`, unless the consumer went away first.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, warn};

use dbanalyst_error_redaction::redact_error_message;
use dbanalyst_query::{DatabaseError, QueryBackend};
use dbanalyst_utils::logging::{log_session_failure, log_session_start, session_span};

use crate::completion::CompletionCapability;
use crate::event::{Clock, EventBody, EventEmitter, StreamEvent, SystemClock};
use crate::machine::{NodeOutcome, Stage, TransitionContext, transition};
use crate::nodes::{self, NodeContext};
use crate::policy::SessionPolicy;
use crate::receipt::{SessionReceipt, write_receipt};
use crate::state::{FailureReason, RunState, SessionFailure, StepStatus};
use crate::stream::SessionStream;

/// Events buffered between a session and its consumer
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A whole session collected at once
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTranscript {
    pub events: Vec<StreamEvent>,
    pub state: RunState,
}

impl SessionTranscript {
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(StreamEvent::event_type).collect()
    }

    #[must_use]
    pub fn terminal(&self) -> Option<&StreamEvent> {
        self.events.last().filter(|e| e.is_terminal())
    }

    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.state.answer.as_deref()
    }
}

/// Runs analysis sessions against one database
#[derive(Clone)]
pub struct Orchestrator {
    completion: Arc<dyn CompletionCapability>,
    query: Arc<dyn QueryBackend>,
    schema: Arc<str>,
    policy: SessionPolicy,
    clock: Arc<dyn Clock>,
    receipts_dir: Option<PathBuf>,
    sessions: Arc<AtomicU64>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("policy", &self.policy)
            .field("schema_chars", &self.schema.len())
            .field("receipts_dir", &self.receipts_dir)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator with a known schema description
    #[must_use]
    pub fn new(
        completion: Arc<dyn CompletionCapability>,
        query: Arc<dyn QueryBackend>,
        schema: impl Into<Arc<str>>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            completion,
            query,
            schema: schema.into(),
            policy,
            clock: Arc::new(SystemClock),
            receipts_dir: None,
            sessions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Orchestrator whose schema description comes from `query`
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the schema cannot be described.
    pub async fn connect(
        completion: Arc<dyn CompletionCapability>,
        query: Arc<dyn QueryBackend>,
        policy: SessionPolicy,
    ) -> Result<Self, DatabaseError> {
        let schema = query.describe_schema().await?;
        debug!(schema_chars = schema.len(), "Schema described");
        Ok(Self::new(completion, query, schema, policy))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persist a receipt for every session that reaches a terminal event
    #[must_use]
    pub fn with_receipts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.receipts_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[must_use]
    pub fn receipts_dir(&self) -> Option<&Path> {
        self.receipts_dir.as_deref()
    }

    /// Start a session on a new task and return its event stream.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start_session(&self, question: impl Into<String>) -> SessionStream {
        let state = RunState::new(self.next_session_id(), question);
        let session_id = state.session_id.clone();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let span = session_span(&session_id);
        let runner = self.clone();
        let task = tokio::spawn(async move { runner.drive(state, tx).await }.instrument(span));
        SessionStream::new(session_id, rx, task)
    }

    /// Run a session to completion and collect every event
    pub async fn run_to_end(&self, question: impl Into<String>) -> SessionTranscript {
        let state = RunState::new(self.next_session_id(), question);
        let span = session_span(&state.session_id);
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let collect = async move {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        };
        let (state, events) = tokio::join!(self.drive(state, tx).instrument(span), collect);
        SessionTranscript { events, state }
    }

    fn next_session_id(&self) -> String {
        let n = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n:04}", self.clock.now().format("%Y%m%dT%H%M%S"))
    }

    async fn drive(&self, mut state: RunState, tx: mpsc::Sender<StreamEvent>) -> RunState {
        let started_at = self.clock.now();
        let mut emitter = EventEmitter::new(Arc::clone(&self.clock));
        log_session_start(&state.session_id, state.question.chars().count());

        if state.question.trim().is_empty() {
            self.fail(
                &mut state,
                FailureReason::InvalidQuestion,
                "question is empty".to_string(),
                &mut emitter,
                &tx,
            )
            .await;
        } else {
            self.run_stages(&mut state, &mut emitter, &tx).await;
        }

        if state.cancelled {
            info!(events = emitter.emitted(), "Session cancelled by consumer");
        } else if let Some(dir) = &self.receipts_dir {
            let finished_at = self.clock.now();
            let receipt =
                SessionReceipt::from_state(&state, emitter.emitted(), started_at, finished_at);
            match write_receipt(dir, &receipt) {
                Ok(path) => debug!(path = %path.display(), "Receipt written"),
                Err(e) => {
                    let error = redact_error_message(&e.to_string());
                    warn!(error = %error, "Failed to write receipt");
                }
            }
        }
        state
    }

    async fn run_stages(
        &self,
        state: &mut RunState,
        emitter: &mut EventEmitter,
        tx: &mpsc::Sender<StreamEvent>,
    ) {
        let ctx = NodeContext {
            completion: self.completion.as_ref(),
            query: self.query.as_ref(),
            schema: &self.schema,
            policy: &self.policy,
        };
        let mut stage = Stage::Planning;

        while !stage.is_terminal() {
            debug!(?stage, version = state.version(), "Entering stage");
            let mut events = Vec::new();

            let outcome = tokio::select! {
                biased;
                () = tx.closed() => None,
                outcome = run_stage(stage, state, ctx, &mut events) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                state.cancelled = true;
                return;
            };

            state.bump_version();
            if !deliver(emitter, tx, events).await {
                state.cancelled = true;
                return;
            }

            let message = outcome.message().map(str::to_string);
            let edges = TransitionContext {
                policy: &self.policy,
                plan_len: state.plan.len(),
            };
            stage = match transition(stage, outcome, edges) {
                Ok(next) => next,
                Err(e) => {
                    error!(error = %e, "Illegal stage transition");
                    let reason = stage.failure_reason();
                    self.fail(state, reason, e.to_string(), emitter, tx).await;
                    return;
                }
            };

            if let Stage::Failed(reason) = stage {
                let message = failure_message(reason, state, message);
                self.fail(state, reason, message, emitter, tx).await;
            }
        }
    }

    async fn fail(
        &self,
        state: &mut RunState,
        reason: FailureReason,
        message: String,
        emitter: &mut EventEmitter,
        tx: &mpsc::Sender<StreamEvent>,
    ) {
        let message = redact_error_message(&message);
        log_session_failure(&state.session_id, reason.as_str(), &message);
        state.failure = Some(SessionFailure {
            reason,
            message: message.clone(),
        });
        state.bump_version();
        if !deliver(emitter, tx, vec![EventBody::SessionFailed { reason, message }]).await {
            state.cancelled = true;
        }
    }
}

async fn run_stage(
    stage: Stage,
    state: &mut RunState,
    ctx: NodeContext<'_>,
    events: &mut Vec<EventBody>,
) -> NodeOutcome {
    match stage {
        Stage::Planning => nodes::plan(state, ctx, events).await,
        Stage::Generating {
            step,
            attempt,
            mode,
        } => nodes::generate_sql(state, ctx, events, step, attempt, mode).await,
        Stage::Executing { step, attempt } => {
            nodes::execute(state, ctx, events, step, attempt).await
        }
        Stage::Correcting { step, next_attempt } => {
            nodes::correct(state, events, step, next_attempt)
        }
        Stage::StepSucceeded { .. } => nodes::record_step(state, StepStatus::Succeeded, events),
        Stage::StepExhausted { .. } => nodes::record_step(state, StepStatus::Exhausted, events),
        Stage::Synthesizing => nodes::synthesize(state, ctx, events).await,
        // Terminal stages never reach here; this outcome has no transition out of them
        Stage::Done | Stage::Failed(_) => NodeOutcome::StepRecorded,
    }
}

/// Emit `bodies` in order. Returns false once the consumer is gone.
async fn deliver(
    emitter: &mut EventEmitter,
    tx: &mpsc::Sender<StreamEvent>,
    bodies: Vec<EventBody>,
) -> bool {
    for body in bodies {
        let event = emitter.emit(body);
        if tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}

fn failure_message(
    reason: FailureReason,
    state: &RunState,
    outcome_message: Option<String>,
) -> String {
    match (reason, outcome_message) {
        (_, Some(message)) => message,
        (FailureReason::SubGoalExhausted, None) => state.completed.last().map_or_else(
            || "sub-goal exhausted its attempts".to_string(),
            |step| {
                format!(
                    "sub-goal {} ({}) failed after {} attempts: {}",
                    step.step,
                    step.description,
                    step.attempts,
                    step.error.as_deref().unwrap_or("unknown error")
                )
            },
        ),
        (reason, None) => format!("session failed during {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use crate::event::ExecutionOutcome;
    use crate::state::AttemptMode;
    use crate::test_support::{ScriptedCompletion, ScriptedQuery, StepClock};
    use dbanalyst_config::OnExhausted;
    use dbanalyst_prompt_template::PromptKind;
    use dbanalyst_query::QueryError;
    use std::time::Duration;

    fn orchestrator(
        completion: &Arc<ScriptedCompletion>,
        query: &Arc<ScriptedQuery>,
        policy: SessionPolicy,
    ) -> Orchestrator {
        Orchestrator::new(completion.clone(), query.clone(), "-- schema", policy)
            .with_clock(Arc::new(StepClock::new()))
    }

    #[tokio::test]
    async fn test_blank_question_fails_without_capability_calls() {
        let completion = Arc::new(ScriptedCompletion::new());
        let query = Arc::new(ScriptedQuery::new());
        let transcript = orchestrator(&completion, &query, SessionPolicy::default())
            .run_to_end("   ")
            .await;

        assert_eq!(transcript.event_types(), vec!["session_failed"]);
        assert_eq!(
            transcript.state.failure.as_ref().map(|f| f.reason),
            Some(FailureReason::InvalidQuestion)
        );
        assert!(completion.requests().is_empty());
        assert!(query.executed().is_empty());
    }

    #[tokio::test]
    async fn test_continue_policy_records_partial_failure() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["count users", "count orders"])
                .sql("SELECT COUNT(*) FROM users")
                .sql("SELECT COUNT(*) FROM userz")
                .sql("SELECT COUNT(*) FROM orders")
                .answer("5 users; orders unknown"),
        );
        let query = Arc::new(
            ScriptedQuery::new()
                .error(QueryError::missing_object("no such table: users"))
                .error(QueryError::missing_object("no such table: userz"))
                .rows(1),
        );
        let policy = SessionPolicy::default()
            .with_max_attempts(2)
            .with_on_exhausted(OnExhausted::Continue);

        let transcript = orchestrator(&completion, &query, policy)
            .run_to_end("users and orders?")
            .await;

        assert_eq!(transcript.answer(), Some("5 users; orders unknown"));
        assert_eq!(transcript.state.completed.len(), 2);
        assert_eq!(transcript.state.completed[0].status, StepStatus::Exhausted);
        assert_eq!(transcript.state.completed[1].status, StepStatus::Succeeded);

        let synth = completion
            .requests()
            .into_iter()
            .find(|r| r.kind() == PromptKind::Synthesize)
            .unwrap();
        assert!(synth.prompt.user.contains("could not be determined"));
    }

    #[tokio::test]
    async fn test_continue_with_no_data_skips_synthesis_call() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["count users"])
                .sql("SELECT nope"),
        );
        let query = Arc::new(ScriptedQuery::new().error(QueryError::syntax("syntax error")));
        let policy = SessionPolicy::default()
            .with_max_attempts(1)
            .with_on_exhausted(OnExhausted::Continue);

        let transcript = orchestrator(&completion, &query, policy)
            .run_to_end("how many users?")
            .await;

        assert_eq!(transcript.answer(), Some(crate::nodes::NO_DATA_ANSWER));
        assert_eq!(completion.calls(PromptKind::Synthesize), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_retries_in_initial_mode() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["count users"])
                .fail(
                    PromptKind::GenerateSql,
                    CompletionError::Unavailable("overloaded".to_string()),
                )
                .sql("SELECT COUNT(*) FROM user")
                .answer("5"),
        );
        let query = Arc::new(ScriptedQuery::new().rows(1));

        let transcript = orchestrator(&completion, &query, SessionPolicy::default())
            .run_to_end("how many users?")
            .await;

        assert_eq!(
            transcript.event_types(),
            vec![
                "plan_produced",
                "correction_attempted",
                "sql_generated",
                "sql_executed",
                "step_completed",
                "answer_synthesized"
            ]
        );
        let generated = transcript
            .events
            .iter()
            .find_map(|e| match &e.body {
                EventBody::SqlGenerated { attempt, mode, .. } => Some((*attempt, *mode)),
                _ => None,
            })
            .unwrap();
        assert_eq!(generated, (2, AttemptMode::Initial));
        assert_eq!(completion.calls(PromptKind::CorrectSql), 0);
    }

    #[tokio::test]
    async fn test_correction_prompt_carries_failed_sql_and_error() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["list emails"])
                .sql("SELECT emial FROM user")
                .sql("SELECT email FROM user")
                .answer("done"),
        );
        let query = Arc::new(
            ScriptedQuery::new()
                .error(QueryError::missing_object("no such column: emial"))
                .rows(2),
        );

        orchestrator(&completion, &query, SessionPolicy::default())
            .run_to_end("emails?")
            .await;

        let correction = completion
            .requests()
            .into_iter()
            .find(|r| r.kind() == PromptKind::CorrectSql)
            .unwrap();
        assert!(correction.prompt.user.contains("SELECT emial FROM user"));
        assert!(correction.prompt.user.contains("missing_object: no such column: emial"));
        assert_eq!(
            query.executed(),
            vec!["SELECT emial FROM user", "SELECT email FROM user"]
        );
    }

    #[tokio::test]
    async fn test_plan_is_truncated_to_max_steps() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["a", " ", "b", "c"])
                .sql("SELECT 1")
                .sql("SELECT 2")
                .answer("ok"),
        );
        let query = Arc::new(ScriptedQuery::new().rows(1).rows(1));
        let mut policy = SessionPolicy::default();
        policy.max_plan_steps = 2;

        let transcript = orchestrator(&completion, &query, policy).run_to_end("q").await;
        assert_eq!(transcript.state.plan, vec!["a", "b"]);
        match &transcript.events[0].body {
            EventBody::PlanProduced { sub_goals } => assert_eq!(sub_goals, &["a", "b"]),
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_payload_caps_rows() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["list users"])
                .sql("SELECT * FROM user")
                .answer("many"),
        );
        let query = Arc::new(ScriptedQuery::new().rows(80));

        let transcript = orchestrator(&completion, &query, SessionPolicy::default())
            .run_to_end("list users")
            .await;
        let outcome = transcript
            .events
            .iter()
            .find_map(|e| match &e.body {
                EventBody::SqlExecuted(report) => Some(report.outcome.clone()),
                _ => None,
            })
            .unwrap();
        match outcome {
            ExecutionOutcome::Success {
                row_count, rows, ..
            } => {
                assert_eq!(row_count, 80);
                assert_eq!(rows.len(), 50);
            }
            ExecutionOutcome::Error { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_session() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["count users"])
                .hang(PromptKind::GenerateSql),
        );
        let query = Arc::new(ScriptedQuery::new());
        let orchestrator = orchestrator(&completion, &query, SessionPolicy::default());

        let mut stream = orchestrator.start_session("how many users?");
        let first = stream.next().await.unwrap();
        assert_eq!(first.event_type(), "plan_produced");

        // Wait until the generation call is in flight, then disconnect
        for _ in 0..100 {
            if completion.calls(PromptKind::GenerateSql) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stream.cancel();
        let state = stream.into_state().await.unwrap();

        assert!(state.cancelled);
        assert!(state.failure.is_none());
        assert_eq!(completion.requests().len(), 2);
        assert!(query.executed().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_written_for_finished_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["count users"])
                .sql("SELECT COUNT(*) FROM user")
                .answer("5"),
        );
        let query = Arc::new(ScriptedQuery::new().rows(1));
        let orchestrator = orchestrator(&completion, &query, SessionPolicy::default())
            .with_receipts_dir(dir.path());

        let transcript = orchestrator.run_to_end("how many users?").await;
        let path = dir
            .path()
            .join(format!("{}.json", transcript.state.session_id));
        let receipt: SessionReceipt =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(receipt.answer.as_deref(), Some("5"));
        assert_eq!(receipt.event_count, transcript.events.len() as u64);
        assert_eq!(receipt.steps[0].row_count, Some(1));
    }

    #[tokio::test]
    async fn test_version_increases_per_transition() {
        let completion = Arc::new(
            ScriptedCompletion::new()
                .plan(&["count users"])
                .sql("SELECT COUNT(*) FROM user")
                .answer("5"),
        );
        let query = Arc::new(ScriptedQuery::new().rows(1));
        let transcript = orchestrator(&completion, &query, SessionPolicy::default())
            .run_to_end("how many users?")
            .await;
        // plan, generate, execute, record, synthesize
        assert_eq!(transcript.state.version(), 5);
    }
}
