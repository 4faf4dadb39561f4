//! dbanalyst - answer questions about a SQL database with an LLM agent
//!
//! A session plans the question into sub-goals, writes SQL for each one, runs
//! it against a read-only SQLite database, repairs failing statements within
//! a bounded number of attempts and synthesizes an answer. Every step is
//! published as an ordered [`StreamEvent`].
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! dbanalyst --db shop.db ask "Which product sold best in May?"
//! dbanalyst --db shop.db ask --ndjson "How many users signed up last week?"
//! dbanalyst --db shop.db chat
//! dbanalyst --db shop.db schema
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use dbanalyst::{Config, build_orchestrator};
//!
//! # async fn demo() -> Result<(), dbanalyst::AnalystError> {
//! let config = Config::builder().database_path("shop.db").build()?;
//! let orchestrator = build_orchestrator(&config).await?;
//! let transcript = orchestrator.run_to_end("How many orders were placed?").await;
//! println!("{:?}", transcript.answer());
//! # Ok(())
//! # }
//! ```

pub mod cli;
mod setup;

pub use setup::{build_orchestrator, open_database};

pub use dbanalyst_config::{CliArgs, Config, ConfigBuilder, ConfigSource, OnExhausted};
pub use dbanalyst_engine::{
    Completion, CompletionCapability, CompletionError, CompletionRequest, EventBody,
    ExecutionOutcome, FailureReason, LlmCompletion, Orchestrator, RunState, SessionPolicy,
    SessionStream, SessionTranscript, StreamEvent,
};
pub use dbanalyst_query::{QueryBackend, QueryError, QueryErrorKind, QueryRows, SqliteBackend};
pub use dbanalyst_utils::error::{AnalystError, UserFriendlyError};
pub use dbanalyst_utils::exit_codes::ExitCode;

#[doc(hidden)]
pub use dbanalyst_engine as engine;
#[doc(hidden)]
pub use dbanalyst_llm as llm;
