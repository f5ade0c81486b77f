//! Toolpin - reproducible, signature-checked installs of plugins and tools
//!
//! Thin command layer over `toolpin_core`: flags are mapped onto the catalog
//! loader, update calculator and executor, results are printed to stdout and
//! logs go to stderr.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use toolpin_core::config::CONFIG_FILE;

mod sign_cli;
mod update_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "toolpin",
    about = "Install, upgrade and lock signed plugins and the tools they manage",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Project configuration file
    #[clap(long, default_value = CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Resolve the configured plugins against the repositories and apply changes
    Update(update_cli::UpdateArgs),

    /// Install exactly the versions recorded in the lock file
    Install(update_cli::InstallArgs),

    /// Show installed plugins and tools
    List,

    /// Create a detached signature for an artifact
    Sign(sign_cli::SignArgs),
}

/// Initialize tracing from --log-level
///
/// Logs go to stderr so stdout only carries command output.
fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    match cli.command {
        Command::Update(args) => update_cli::run_update(&cli.config, &args).await,
        Command::Install(args) => update_cli::run_install(&cli.config, &args).await,
        Command::List => update_cli::run_list(&cli.config),
        Command::Sign(args) => sign_cli::run_sign(&args),
    }
}
