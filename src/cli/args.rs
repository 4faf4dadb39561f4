//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dbanalyst_config::{CliArgs, OnExhausted};

/// dbanalyst - ask questions about a SQL database
#[derive(Parser, Debug)]
#[command(name = "dbanalyst")]
#[command(about = "Answer questions about a SQLite database by planning, running and repairing SQL with an LLM")]
#[command(long_about = r#"
dbanalyst breaks a question into steps, writes SQL for each step, runs it
against a read-only database, repairs failing queries and writes an answer.
Every step is streamed as it happens.

EXAMPLES:
  # One question, human-readable progress
  dbanalyst --db shop.db ask "Which product sold best in May?"

  # One question, newline-delimited JSON events on stdout
  dbanalyst --db shop.db ask --ndjson "How many users signed up last week?"

  # Interactive session
  dbanalyst --db shop.db chat

  # Show the schema description given to the model
  dbanalyst --db shop.db schema

CONFIGURATION:
  Precedence: CLI flags > config file > defaults
  The config file is found by searching upward from CWD for .dbanalyst/config.toml
  (or via --config / DBANALYST_CONFIG). API keys are read from environment
  variables only (ANTHROPIC_API_KEY, OPENROUTER_API_KEY by default).
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database to query
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// LLM provider: anthropic or openrouter
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model to use for LLM calls
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Attempts per sub-goal, the first one included (1-10)
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// What to do when a sub-goal runs out of attempts: abort or continue
    #[arg(long, global = true, value_parser = OnExhausted::parse)]
    pub on_exhausted: Option<OnExhausted>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask one question and stream the session
    Ask {
        /// The question to answer
        question: String,

        /// Emit events as newline-delimited JSON
        #[arg(long)]
        ndjson: bool,
    },

    /// Ask questions interactively until quit/exit/q
    Chat,

    /// Print the schema description of the database
    Schema,

    /// Print the effective configuration and where each value came from
    Config,
}

impl Cli {
    /// Overrides for configuration discovery
    #[must_use]
    pub fn to_cli_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            db_path: self.db.clone(),
            llm_provider: self.provider.clone(),
            model: self.model.clone(),
            max_attempts: self.max_attempts,
            on_exhausted: self.on_exhausted,
            verbose: self.verbose.then_some(true),
        }
    }
}

/// Build the clap command (for completions and doc generation)
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
