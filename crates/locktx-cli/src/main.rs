//! Main entry point for the locktx command-line tool.

use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use locktx_cli::{Cli, Command, Configuration, command, init_logging};
use locktx_common::{AppError, EXIT_LOCK_CONTENTION};
use locktx_persistence::{CancelSignal, TransactionCoordinator};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err.inner());
            if err.is_lock_contention() {
                ExitCode::from(EXIT_LOCK_CONTENTION as u8)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let configuration = Configuration::load(&cli)?;
    let _logging_guard = init_logging(&configuration.logging_config())
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    match cli.command {
        Command::Key { names } => {
            for (name, key) in command::lock_keys(&names) {
                println!("{}\t{}", name, key);
            }
        }
        Command::Exec {
            locks,
            lock_timeout,
            statements,
        } => {
            let coordinator = coordinator(&configuration).await?;
            let cancel = cancel_on_ctrl_c();
            let affected =
                command::exec(&coordinator, &locks, lock_timeout, statements, &cancel).await?;
            for rows in affected {
                println!("{}", rows);
            }
        }
        Command::Hold {
            locks,
            seconds,
            lock_timeout,
        } => {
            let coordinator = coordinator(&configuration).await?;
            let cancel = cancel_on_ctrl_c();
            command::hold(&coordinator, &locks, seconds, lock_timeout, &cancel).await?;
            info!("Locks released");
        }
    }

    Ok(())
}

async fn coordinator(configuration: &Configuration) -> Result<TransactionCoordinator, AppError> {
    let db = configuration.database_connection().await?;
    Ok(TransactionCoordinator::new(db)
        .with_default_lock_timeout(configuration.lock_timeout_seconds()))
}

/// Cancel signal fired by Ctrl+C
fn cancel_on_ctrl_c() -> CancelSignal {
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, cancelling transaction...");
                trigger.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    });

    cancel
}
