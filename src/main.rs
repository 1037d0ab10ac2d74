//! PostgreSQL backup tool for S3-compatible object storage
//!
//! Dumps a database with `pg_dump`, compresses or encrypts the dump, uploads
//! it and prunes old backups. Runs once or on a daily schedule.

// pg-r2-backup/src/main.rs
mod backup;
mod cli;
mod commands;
mod config;
mod errors;
mod scheduler;
mod utils;

use clap::{CommandFactory, Parser};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

use cli::{Cli, Commands, ConfigCommand};
use config::{ProcessEnv, lookup, resolve_backup_time};

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; the process environment may carry everything.
    dotenv::dotenv().ok();
    utils::logging::init();

    // Unknown commands exit 1; --help and --version still exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    if run_app(cli).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_app(cli: Cli) -> bool {
    let env = ProcessEnv;
    match cli.command {
        Some(Commands::Run) => backup::run_backup_logged(&env).await,
        Some(Commands::Daemon) => {
            run_daemon().await;
            true
        }
        Some(Commands::Doctor) => commands::doctor::execute(&env).await,
        Some(Commands::Config {
            action: Some(ConfigCommand::Show { json }),
        }) => report(commands::config_show::execute(&env, json)),
        Some(Commands::Init) => match commands::init::execute(Path::new(".")) {
            Ok(outcome) => !outcome.is_failure(),
            Err(e) => {
                error!("{:#}", e);
                false
            }
        },
        Some(Commands::Schedule) => {
            commands::schedule::execute();
            true
        }
        Some(Commands::Config { action: None }) | None => {
            // Help output is best effort.
            let _ = Cli::command().print_help();
            println!();
            false
        }
    }
}

async fn run_daemon() {
    let at = resolve_backup_time(lookup(&ProcessEnv, "BACKUP_TIME").as_deref()).into_logged();
    info!("Starting backup scheduler...");
    info!("Scheduled backup time: {} UTC", at);

    scheduler::run_daily(
        at,
        chrono::Utc::now,
        || async {
            backup::run_backup_logged(&ProcessEnv).await;
        },
        scheduler::shutdown_signal(),
    )
    .await;
}

fn report(result: anyhow::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("{:#}", e);
            false
        }
    }
}
