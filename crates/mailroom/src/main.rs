// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mailroom - email campaign scheduling, delivery and tracking.
//!
//! This is the binary entry point: the scheduler trigger (`tick`), the
//! tracking server (`serve`), bulk import, and the operator commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod campaign;
mod doctor;
mod import;
mod output;
mod recipient;
mod serve;
mod tick;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mailroom_config::MailroomConfig;

/// Mailroom - email campaign scheduling, delivery and tracking.
#[derive(Parser, Debug)]
#[command(name = "mailroom", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one scheduler pass over due and stalled campaigns.
    Tick,
    /// Serve the tracking endpoints until interrupted.
    Serve,
    /// Import recipients from a CSV file with a header row.
    Import {
        /// Path to the CSV file.
        file: PathBuf,
    },
    /// Manage campaigns.
    #[command(subcommand)]
    Campaign(campaign::CampaignCommand),
    /// Manage recipients and the deletion archive.
    #[command(subcommand)]
    Recipient(recipient::RecipientCommand),
    /// Check configuration, storage, and the mail relay.
    Doctor {
        /// Also run the slower checks.
        #[arg(long)]
        deep: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => mailroom_config::load_and_validate_path(path),
        None => mailroom_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            mailroom_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.service.log_level);

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Commands,
    config: MailroomConfig,
) -> Result<ExitCode, mailroom_core::MailroomError> {
    match command {
        Commands::Tick => tick::run_tick(config).await,
        Commands::Serve => serve::run_serve(config).await.map(|()| ExitCode::SUCCESS),
        Commands::Import { file } => import::run_import(config, &file)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Campaign(cmd) => campaign::run(config, cmd).await.map(|()| ExitCode::SUCCESS),
        Commands::Recipient(cmd) => recipient::run(config, cmd)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Doctor { deep, plain } => doctor::run_doctor(&config, deep, plain).await,
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so command output on stdout stays machine readable.
/// `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mailroom={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
