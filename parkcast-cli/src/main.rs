//! Parkcast CLI: seven-day park traffic forecasts from the terminal.
//!
//! Runs the two-stage model chain, then publishes an HTML dashboard and
//! CSV/JSON prediction files.

mod commands;
mod render;
mod sink;

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Parkcast: visitor, vehicle and traffic-flow forecasts for the week ahead
#[derive(Parser, Debug)]
#[command(name = "parkcast", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the forecast and publish the dashboard and prediction files
    Run(RunArgs),
    /// Show the model schemas and check they fit together
    Schema,
    /// List the holiday calendar for a year
    Holidays {
        /// Year to list (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// First forecast day (YYYY-MM-DD); defaults to the configured start
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Number of days to forecast (1-7)
    #[arg(long)]
    horizon: Option<usize>,

    /// Mark days with missing inputs as unavailable instead of failing
    #[arg(long)]
    best_effort: bool,

    /// Output directory for the dashboard and prediction files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the HTML dashboard
    #[arg(long)]
    no_html: bool,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "parkcast", "parkcast")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "parkcast.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref(), cli.quiet).await
}
