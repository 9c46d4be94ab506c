//! Call Recording Restore Tool
//!
//! Restores the graph, media and signaling archives of individual calls
//! from minute-bucketed cold storage.

// cdr-restore/src/main.rs
mod archive;
mod config;
mod errors;
mod restore;
mod storage;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use config::AppConfig;
use restore::{BatchCoordinator, RestoreRequest, build_restore_service, parse_call_date};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cdr-restore", version, about = "Restore archived call recordings")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "CDR_RESTORE_CONFIG", default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Restore a single call.
    Restore {
        /// Call timestamp, e.g. 2024-03-01T14:05:00 or RFC 3339.
        #[arg(long, value_parser = parse_call_date)]
        call_date: NaiveDateTime,
        #[arg(long)]
        call_id: String,
    },
    /// Restore every call listed in a JSON array of {"callDate", "callId"}.
    RestoreMany {
        /// Request file, or `-` for stdin.
        #[arg(long)]
        input: PathBuf,
    },
}

/// Main entry point for the restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cdr_restore=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    match run_app(Cli::parse()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = AppConfig::load_from_json(&cli.config)
        .context(format!("Failed to load application configuration from {}", cli.config.display()))?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let service = build_restore_service(&app_config).await?;

    let rendered = match cli.command {
        Command::Restore { call_date, call_id } => {
            let request = RestoreRequest { call_date, call_id };
            let output = service.restore_single(&request, &cancel).await;
            serde_json::to_string_pretty(&output)?
        }
        Command::RestoreMany { input } => {
            let requests = read_requests(&input)?;
            let coordinator = BatchCoordinator::new(service, app_config.max_degree_of_parallelism);
            let responses = coordinator.restore_many(requests, &cancel).await;
            serde_json::to_string_pretty(&responses)?
        }
    };

    println!("{}", rendered);
    Ok(())
}

fn read_requests(input: &Path) -> Result<Vec<RestoreRequest>> {
    let content = if input.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read requests from stdin")?
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read request file {}", input.display()))?
    };
    let requests: Vec<RestoreRequest> =
        serde_json::from_str(&content).context("Request file must be a JSON array of {\"callDate\", \"callId\"}")?;
    info!(count = requests.len(), "Loaded restore requests");
    Ok(requests)
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling in-flight restores");
            cancel.cancel();
        }
    });
}
