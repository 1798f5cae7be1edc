//! Tally CLI - DeepSeek balance monitor in your terminal

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{daemon, interval, key, logs, refresh, request, status};

/// Tally - keeps an eye on your DeepSeek API balance
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background monitor; reads JSON requests from stdin
    Daemon {
        /// Keep everything in memory (nothing is written to the data directory)
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show stored settings and key state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch the balance now
    Refresh {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store a new API key (replaces the old key and its encryption key)
    SetKey {
        /// API key; prompted for when omitted
        #[arg(long, env = "TALLY_API_KEY", hide_env_values = true)]
        key: Option<String>,
        /// Store without checking the key against the API first
        #[arg(long)]
        skip_validate: bool,
    },

    /// Check an API key against the API without storing it
    ValidateKey {
        /// API key; prompted for when omitted
        #[arg(long)]
        key: Option<String>,
    },

    /// Set the refresh interval in minutes (1 to 1440)
    Interval {
        #[arg(allow_negative_numbers = true)]
        minutes: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove the stored API key and encryption key
    Reset {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Send a raw JSON request, e.g. '{"action":"getBalance"}'
    Request {
        message: String,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Daemon { .. }));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            output::error(&format!("Failed to start async runtime: {}", e));
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run(cli));
    // The stdin reader of `daemon` may still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_millis(250));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr; `TALLY_LOG` overrides the default level
fn init_tracing(daemon: bool) {
    let default = if daemon { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Daemon { ephemeral } => daemon::run(ephemeral).await,
        Commands::Status { json } => status::run(json).await,
        Commands::Refresh { json } => refresh::run(json).await,
        Commands::SetKey { key, skip_validate } => key::run_set(key, skip_validate).await,
        Commands::ValidateKey { key } => key::run_validate(key).await,
        Commands::Interval { minutes, json } => interval::run(minutes, json).await,
        Commands::Reset { force } => key::run_reset(force).await,
        Commands::Request { message } => request::run(&message).await,
        Commands::Logs { command } => logs::run(command),
    }
}
