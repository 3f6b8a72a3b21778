//! Operator CLI over the blueprint association manager.
//!
//! # Responsibility
//! - Load config, start file logging and open the migrated database.
//! - Run one manager operation per invocation and print JSON to stdout.
//! - Map failures to a JSON error envelope and a non-zero exit code.

mod cli;
mod error;

use blueprint_core::db::open_db_with_config;
use blueprint_core::{init_logging_from_config, AssociationManager, CoreConfig, SaveRequest};
use clap::Parser;
use cli::{Cli, Command};
use error::CliError;
use log::{error, info};
use serde::Serialize;
use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                "event=cli_command module=cli status=error error_code={} error={}",
                err.code(),
                err
            );
            if let Ok(json) = serde_json::to_string_pretty(&err.envelope()) {
                println!("{json}");
            } else {
                eprintln!("{err}");
            }
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::from_env()?,
    };
    init_logging_from_config(&config.logging).map_err(CliError::Logging)?;
    info!(
        "event=cli_start module=cli status=ok version={} db_path={}",
        blueprint_core::core_version(),
        config.database.path.display()
    );

    let conn = open_db_with_config(&config.database)?;
    let manager =
        AssociationManager::try_from_connection(&conn, config.associations.conflict_policy)?;

    match cli.command {
        Command::Candidates { template_id, query } => {
            let courses = match query {
                Some(query) => manager.search_candidates(template_id, &query)?,
                None => manager.candidates(template_id)?,
            };
            print_json(&courses)
        }
        Command::Associations { template_id } => {
            print_json(&manager.associations(template_id)?)
        }
        Command::Save {
            template_id,
            add,
            remove,
        } => {
            let saved = manager.save_changes(template_id, &SaveRequest { add, remove })?;
            print_json(&saved)
        }
        Command::SetMaster { course_id } => print_json(&manager.set_as_master_course(course_id)?),
    }
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), CliError> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, payload)?;
    writeln!(handle).map_err(|err| CliError::Output(serde_json::Error::io(err)))?;
    Ok(())
}
