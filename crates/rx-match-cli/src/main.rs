//! rx-match CLI.

use std::io::{self, IsTerminal};

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

mod cli;
mod commands;
mod logging;

use crate::cli::{Cli, Command, LogFormatArg};
use crate::commands::{load_config, run_import, run_match, run_search};
use crate::logging::{init_logging, LogConfig, LogFormat};

fn main() {
    let cli = Cli::parse();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }

    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Command::Import(args) => {
            let count = run_import(&cli.db, args)?;
            println!("Imported {count} products into {}", cli.db.display());
            Ok(0)
        }
        Command::Search(args) => {
            let products = run_search(&cli.db, args)?;
            print_json(&products)?;
            Ok(0)
        }
        Command::Match(args) => {
            let config = load_config(cli.config.as_deref())?;
            let report = run_match(&cli.db, config, args)?;
            print_json(&report)?;
            Ok(if report.validation.is_valid { 0 } else { 2 })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Build logging configuration from CLI flags.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        use_env_filter: !cli.verbosity.is_present(),
        with_ansi: cli.log_file.is_none() && io::stderr().is_terminal(),
        format: match cli.log_format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        },
        log_file: cli.log_file.clone(),
    }
}
