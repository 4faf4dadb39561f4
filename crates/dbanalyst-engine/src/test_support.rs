//! Scripted capabilities for tests
//!
//! [`ScriptedCompletion`] replays canned replies per prompt kind (generation
//! and correction share one queue), [`ScriptedQuery`] replays query results in
//! call order and [`StepClock`] advances one second per reading.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::Value;

use dbanalyst_prompt_template::PromptKind;
use dbanalyst_query::{DatabaseError, QueryBackend, QueryError, QueryRows, Record};

use crate::completion::{Completion, CompletionCapability, CompletionError, CompletionRequest};
use crate::event::Clock;

/// One scripted completion reply
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(Completion),
    Fail(CompletionError),
    /// Never resolves
    Hang,
}

#[derive(Default)]
pub struct ScriptedCompletion {
    script: Mutex<HashMap<PromptKind, VecDeque<Scripted>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

fn queue_key(kind: PromptKind) -> PromptKind {
    match kind {
        PromptKind::CorrectSql => PromptKind::GenerateSql,
        other => other,
    }
}

impl ScriptedCompletion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(self, kind: PromptKind, reply: Scripted) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(queue_key(kind))
            .or_default()
            .push_back(reply);
        self
    }

    #[must_use]
    pub fn plan(self, sub_goals: &[&str]) -> Self {
        let goals = sub_goals.iter().map(|g| (*g).to_string()).collect();
        self.then(PromptKind::Plan, Scripted::Reply(Completion::Plan(goals)))
    }

    #[must_use]
    pub fn sql(self, sql: &str) -> Self {
        self.then(
            PromptKind::GenerateSql,
            Scripted::Reply(Completion::Sql(sql.to_string())),
        )
    }

    #[must_use]
    pub fn answer(self, answer: &str) -> Self {
        self.then(
            PromptKind::Synthesize,
            Scripted::Reply(Completion::Answer(answer.to_string())),
        )
    }

    #[must_use]
    pub fn fail(self, kind: PromptKind, error: CompletionError) -> Self {
        self.then(kind, Scripted::Fail(error))
    }

    #[must_use]
    pub fn hang(self, kind: PromptKind) -> Self {
        self.then(kind, Scripted::Hang)
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests of exactly `kind`
    pub fn calls(&self, kind: PromptKind) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.kind() == kind)
            .count()
    }
}

#[async_trait]
impl CompletionCapability for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let kind = request.kind();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&queue_key(kind))
            .and_then(VecDeque::pop_front);

        match next {
            Some(Scripted::Reply(completion)) => Ok(completion),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(CompletionError::Unavailable(format!(
                "no scripted reply for {kind}"
            ))),
        }
    }
}

/// One scripted query result
enum QueryStep {
    Return(Result<QueryRows, QueryError>),
    /// Never resolves
    Hang,
}

pub struct ScriptedQuery {
    schema: String,
    results: Mutex<VecDeque<QueryStep>>,
    executed: Mutex<Vec<String>>,
}

impl Default for ScriptedQuery {
    fn default() -> Self {
        Self {
            schema: "-- TABLE: user (5 records)\nCREATE TABLE user (user_id INTEGER, name TEXT);"
                .to_string(),
            results: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: QueryStep) -> Self {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    #[must_use]
    pub fn returning(self, result: Result<QueryRows, QueryError>) -> Self {
        self.push(QueryStep::Return(result))
    }

    /// The next execution never completes
    #[must_use]
    pub fn hang(self) -> Self {
        self.push(QueryStep::Hang)
    }

    #[must_use]
    pub fn rows(self, n: usize) -> Self {
        self.returning(Ok(rows(n)))
    }

    #[must_use]
    pub fn error(self, error: QueryError) -> Self {
        self.returning(Err(error))
    }

    /// Statements executed, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl QueryBackend for ScriptedQuery {
    async fn execute(&self, sql: &str) -> Result<QueryRows, QueryError> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
        let next = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(QueryStep::Return(result)) => result,
            Some(QueryStep::Hang) => std::future::pending().await,
            None => Err(QueryError::runtime("no scripted result")),
        }
    }

    async fn describe_schema(&self) -> Result<String, DatabaseError> {
        Ok(self.schema.clone())
    }
}

/// `n` rows of `(user_id, name)`
#[must_use]
pub fn rows(n: usize) -> QueryRows {
    QueryRows {
        columns: vec!["user_id".to_string(), "name".to_string()],
        rows: (0..n)
            .map(|i| {
                let mut record = Record::new();
                record.insert("user_id".to_string(), Value::from(i + 1));
                record.insert("name".to_string(), Value::from(format!("user{}", i + 1)));
                record
            })
            .collect(),
        truncated: false,
    }
}

/// Deterministic clock starting at 2026-01-01T00:00:00Z
#[derive(Debug, Default)]
pub struct StepClock {
    ticks: AtomicI64,
}

impl StepClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        let start = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        start + ChronoDuration::seconds(tick)
    }
}
