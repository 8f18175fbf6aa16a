//! hlsload CLI - Headless HLS Viewer Simulator
//!
//! Features:
//! - Single simulated playback session with a timing report
//! - Concurrent load runs against an origin or CDN
//! - Manifest inspection

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// hlsload - HLS load generator
#[derive(Parser)]
#[command(name = "hlsload")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Simulates HLS viewers and reports per-request timings", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    /// JSON simulation config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: commands::ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a single viewer
    Play {
        /// URL of the master manifest
        url: String,

        /// Variant index (wraps around); random if omitted
        #[arg(short, long)]
        quality: Option<usize>,

        /// Stop after this many seconds of playback
        #[arg(short, long)]
        duration: Option<f64>,

        /// Print every request event
        #[arg(long)]
        events: bool,
    },

    /// Run many concurrent viewers
    Load {
        /// URL of the master manifest
        url: String,

        /// Number of concurrent viewers
        #[arg(short, long, default_value = "10")]
        users: usize,

        /// Viewers started per second
        #[arg(short, long, default_value = "1")]
        spawn_rate: f64,

        /// Total run time in seconds
        #[arg(short, long, default_value = "60")]
        run_time: u64,

        /// Variant index (wraps around); random if omitted
        #[arg(short, long)]
        quality: Option<usize>,

        /// Per-session playback cap in seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Seconds each viewer waits between sessions (at least one tick)
        #[arg(short, long, default_value = "1")]
        wait: f64,
    },

    /// Fetch and parse a single manifest
    Inspect {
        /// URL of a master manifest or media playlist
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    hlsload_core::init();

    let config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Commands::Play { url, quality, duration, events } => {
            commands::play(&url, quality, duration, events, config, &cli.format).await?;
        }
        Commands::Load { url, users, spawn_rate, run_time, quality, duration, wait } => {
            let wait = std::time::Duration::try_from_secs_f64(wait)
                .map_err(|e| anyhow::anyhow!("--wait {} is invalid: {}", wait, e))?;
            let options = commands::LoadOptions {
                users,
                spawn_rate,
                run_time: std::time::Duration::from_secs(run_time),
                quality,
                duration,
                wait,
            };
            commands::load(&url, options, config, &cli.format).await?;
        }
        Commands::Inspect { url } => {
            commands::inspect(&url, config, &cli.format).await?;
        }
    }

    Ok(())
}
