//! Real SQLite database behind the engine

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tempfile::TempDir;

use dbanalyst::{
    EventBody, ExecutionOutcome, Orchestrator, QueryBackend, QueryErrorKind, SessionPolicy,
    SqliteBackend,
};
use dbanalyst_engine::receipt::SessionReceipt;
use dbanalyst_engine::test_support::{ScriptedCompletion, StepClock};

fn seed(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("shop.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE user (user_id INTEGER PRIMARY KEY, name TEXT NOT NULL, unit_id INTEGER);
         CREATE TABLE unit (unit_id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         INSERT INTO unit (unit_id, name) VALUES (1, 'Sales'), (2, 'Support');
         INSERT INTO user (name, unit_id) VALUES
             ('ada', 1), ('grace', 1), ('linus', 2), ('ken', 2), ('barbara', 2);",
    )
    .unwrap();
    path
}

fn backend(dir: &TempDir) -> SqliteBackend {
    SqliteBackend::open(&seed(dir.path()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn guard_rejects_writes_before_they_reach_the_database() {
    let dir = TempDir::new().unwrap();
    let db = backend(&dir);

    for sql in [
        "DELETE FROM user",
        "UPDATE user SET name = 'x'",
        "DROP TABLE user",
        "INSERT INTO unit VALUES (3, 'Legal')",
        "SELECT 1; DROP TABLE user",
    ] {
        let err = db.execute(sql).await.unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Rejected, "{sql}");
    }

    let rows = db.execute("SELECT COUNT(*) AS n FROM user").await.unwrap();
    assert_eq!(rows.rows[0]["n"], serde_json::json!(5));
}

#[tokio::test]
async fn errors_are_classified_by_cause() {
    let dir = TempDir::new().unwrap();
    let db = backend(&dir);

    let missing = db.execute("SELECT * FROM users").await.unwrap_err();
    assert_eq!(missing.kind, QueryErrorKind::MissingObject);
    assert!(missing.message.contains("no such table: users"));

    let syntax = db.execute("SELECT name FROM user WHERE").await.unwrap_err();
    assert_eq!(syntax.kind, QueryErrorKind::Syntax);

    let column = db.execute("SELECT nickname FROM user").await.unwrap_err();
    assert_eq!(column.kind, QueryErrorKind::MissingObject);
}

#[tokio::test]
async fn schema_description_lists_tables_with_counts_and_samples() {
    let dir = TempDir::new().unwrap();
    let db = backend(&dir);

    let text = db.describe_schema().await.unwrap();
    assert!(text.contains("-- TABLE: user (5 records)"));
    assert!(text.contains("-- TABLE: unit (2 records)"));
    assert!(text.contains("CREATE TABLE user"));
    assert!(text.contains("-- Columns: user_id, name, unit_id"));
    assert!(text.contains("-- Sample 1: 1, ada, 1"));
}

#[tokio::test]
async fn row_limit_is_reported_through_the_session() {
    let dir = TempDir::new().unwrap();
    let completion = Arc::new(
        ScriptedCompletion::new()
            .plan(&["list users"])
            .sql("SELECT name FROM user ORDER BY user_id")
            .answer("at least 3 users"),
    );
    let database = backend(&dir).with_row_limit(3);

    let transcript = Orchestrator::connect(completion, Arc::new(database), SessionPolicy::default())
        .await
        .unwrap()
        .with_clock(Arc::new(StepClock::new()))
        .run_to_end("List the users")
        .await;

    let outcome = transcript
        .events
        .iter()
        .find_map(|e| match &e.body {
            EventBody::SqlExecuted(report) => Some(&report.outcome),
            _ => None,
        })
        .unwrap();
    match outcome {
        ExecutionOutcome::Success {
            row_count,
            truncated,
            ..
        } => {
            assert_eq!(*row_count, 3);
            assert!(*truncated);
        }
        ExecutionOutcome::Error { .. } => panic!("expected success"),
    }
    let context = transcript.state.completed[0].context_json(50);
    assert_eq!(context["truncated"], serde_json::json!(true));
}

#[tokio::test]
async fn session_recovers_from_wrong_table_name() {
    let dir = TempDir::new().unwrap();
    let receipts = dir.path().join("receipts");
    let completion = Arc::new(
        ScriptedCompletion::new()
            .plan(&["count users per unit"])
            .sql("```sql\nSELECT u.name, COUNT(*) AS n FROM users JOIN unit u USING (unit_id) GROUP BY u.name\n```")
            .sql("SELECT u.name, COUNT(*) AS n FROM user JOIN unit u USING (unit_id) GROUP BY u.name ORDER BY u.name;")
            .answer("Sales has 2 users and Support has 3."),
    );

    let orchestrator = Orchestrator::connect(
        completion.clone(),
        Arc::new(backend(&dir)),
        SessionPolicy::default(),
    )
    .await
    .unwrap()
    .with_clock(Arc::new(StepClock::new()))
    .with_receipts_dir(&receipts);
    assert!(orchestrator.schema().contains("-- TABLE: user (5 records)"));

    let transcript = orchestrator.run_to_end("How many users are in each unit?").await;

    let outcomes: Vec<&ExecutionOutcome> = transcript
        .events
        .iter()
        .filter_map(|e| match &e.body {
            EventBody::SqlExecuted(report) => Some(&report.outcome),
            _ => None,
        })
        .collect();
    assert_eq!(outcomes.len(), 2);
    match outcomes[0] {
        ExecutionOutcome::Error { kind, message } => {
            assert_eq!(kind.as_str(), "missing_object");
            assert!(message.contains("users"));
        }
        ExecutionOutcome::Success { .. } => panic!("first attempt should fail"),
    }
    match outcomes[1] {
        ExecutionOutcome::Success {
            row_count, rows, ..
        } => {
            assert_eq!(*row_count, 2);
            assert_eq!(rows[0]["name"], serde_json::json!("Sales"));
            assert_eq!(rows[1]["n"], serde_json::json!(3));
        }
        ExecutionOutcome::Error { .. } => panic!("correction should succeed"),
    }

    let requests = completion.requests();
    let correction = &requests[2];
    assert!(correction.prompt.user.contains("no such table: users"));
    assert_eq!(
        transcript.answer(),
        Some("Sales has 2 users and Support has 3.")
    );

    let receipt_path = receipts.join(format!("{}.json", transcript.state.session_id));
    let receipt: SessionReceipt =
        serde_json::from_str(&std::fs::read_to_string(receipt_path).unwrap()).unwrap();
    assert_eq!(receipt.event_count, transcript.events.len() as u64);
    assert_eq!(receipt.steps.len(), 1);
    assert_eq!(receipt.steps[0].attempts, 2);
}
