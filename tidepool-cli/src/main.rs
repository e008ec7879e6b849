//! Tidepool CLI - Command-line interface
//!
//! Runs the provider conformance suites and lists what the registry holds.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tidepool_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "tidepool")]
#[command(about = "Conformance harness for torrent search providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full-trace log file
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref()) {
        eprintln!("Failed to initialize tracing: {e}");
    }

    commands::handle_command(cli.command).await
}
