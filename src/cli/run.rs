//! CLI entry point and dispatch
//!
//! `run()` parses arguments, discovers configuration, initializes logging,
//! creates the runtime and dispatches. It prints every error itself and
//! returns the exit code for `main` to use.

use clap::Parser;

use dbanalyst_config::Config;
use dbanalyst_utils::error::AnalystError;
use dbanalyst_utils::exit_codes::ExitCode;
use dbanalyst_utils::logging::init_tracing;

use super::args::{Cli, Commands};
use super::commands;

/// Main CLI execution function.
///
/// Returns `Err(ExitCode)` after the error has been reported on stderr.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = cli.to_cli_args();

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let err = AnalystError::Config(err);
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    if let Err(e) = init_tracing(config.verbose()) {
        eprintln!("✗ Failed to initialize logging: {e}");
        return Err(ExitCode::INTERNAL);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Ask { question, ndjson } => commands::ask(&config, &question, ndjson).await,
            Commands::Chat => commands::chat(&config).await,
            Commands::Schema => commands::schema(&config).await,
            Commands::Config => {
                commands::show_config(&config);
                Ok(())
            }
        }
    });

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if !matches!(err, AnalystError::SessionFailed { .. }) {
                eprintln!("{}", err.display_for_user());
            }
            Err(err.to_exit_code())
        }
    }
}
