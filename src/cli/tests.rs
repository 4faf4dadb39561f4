use std::sync::Arc;

use clap::Parser;

use super::args::{Cli, Commands, build_cli};
use super::commands::stream_session_until;
use dbanalyst_config::OnExhausted;
use dbanalyst_engine::test_support::{ScriptedCompletion, ScriptedQuery};
use dbanalyst_engine::{Orchestrator, SessionPolicy};
use dbanalyst_prompt_template::PromptKind;
use dbanalyst_utils::error::AnalystError;
use dbanalyst_utils::exit_codes::ExitCode;

#[test]
fn test_cli_definition_is_valid() {
    build_cli().debug_assert();
}

#[test]
fn test_ask_with_global_flags() {
    let cli = Cli::try_parse_from([
        "dbanalyst",
        "--db",
        "shop.db",
        "--max-attempts",
        "4",
        "--on-exhausted",
        "continue",
        "ask",
        "--ndjson",
        "How many orders?",
    ])
    .unwrap();

    match &cli.command {
        Commands::Ask { question, ndjson } => {
            assert_eq!(question, "How many orders?");
            assert!(*ndjson);
        }
        other => panic!("unexpected command {other:?}"),
    }

    let args = cli.to_cli_args();
    assert_eq!(args.db_path.as_deref(), Some(std::path::Path::new("shop.db")));
    assert_eq!(args.max_attempts, Some(4));
    assert_eq!(args.on_exhausted, Some(OnExhausted::Continue));
    assert_eq!(args.verbose, None);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["dbanalyst", "schema", "--db", "x.db", "-v"]).unwrap();
    assert!(matches!(cli.command, Commands::Schema));
    assert_eq!(cli.to_cli_args().verbose, Some(true));
}

#[test]
fn test_invalid_policy_is_rejected() {
    let result = Cli::try_parse_from(["dbanalyst", "--on-exhausted", "retry", "chat"]);
    assert!(result.is_err());
}

#[test]
fn test_ask_requires_question() {
    assert!(Cli::try_parse_from(["dbanalyst", "ask"]).is_err());
}

#[tokio::test]
async fn test_interrupted_session_exits_non_zero() {
    let completion = Arc::new(ScriptedCompletion::new().hang(PromptKind::Plan));
    let orchestrator = Orchestrator::new(
        completion,
        Arc::new(ScriptedQuery::new()),
        "-- TABLE: user (1 records)",
        SessionPolicy::default(),
    );

    let err = stream_session_until(&orchestrator, "How many users?", true, async {})
        .await
        .unwrap_err();
    assert!(matches!(err, AnalystError::Interrupted { .. }));
    assert_eq!(err.to_exit_code(), ExitCode::INTERRUPTED);
}

#[tokio::test]
async fn test_finished_session_returns_terminal_event() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .plan(&["count users"])
            .sql("SELECT COUNT(*) FROM user")
            .answer("1"),
    );
    let orchestrator = Orchestrator::new(
        completion,
        Arc::new(ScriptedQuery::new().rows(1)),
        "-- TABLE: user (1 records)",
        SessionPolicy::default(),
    );

    let (_, terminal) =
        stream_session_until(&orchestrator, "How many users?", true, std::future::pending::<()>())
            .await
            .unwrap();
    assert_eq!(terminal.unwrap().event_type(), "answer_synthesized");
}
