mod cli;
mod commands;
mod config;
mod inventory_file;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::WeaverConfig;
use reconcile::EngineError;
use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(if cli.quiet { log::LevelFilter::Error } else { log_level })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            ui::error(&format!("{:#}", error));
            ExitCode::from(exit_code(&error))
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let config = WeaverConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Validate(args) => commands::validate::run(&args),
        Command::Plan(args) => commands::plan::run(&config, &args),
        Command::Apply(args) => commands::apply::run(&config, &args),
        Command::Drift(args) => commands::drift::run(&config, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "weaver", &mut io::stdout());
            Ok(0)
        }
    }
}

/// Map engine failures to stable exit codes for scripting; anything
/// that is not an engine error is a generic failure.
fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<EngineError>() {
        Some(EngineError::Validation(_)) => 2,
        Some(EngineError::Calculation(_) | EngineError::Generate(_)) => 3,
        Some(EngineError::Blocked { .. } | EngineError::ApprovalRequired) => 4,
        Some(EngineError::Inventory(_)) => 5,
        _ => 1,
    }
}
