//! Beamcast CLI
//!
//! Live camera-to-RTMP streaming from the terminal, driven by synthetic
//! capture sources.
//!
//! # Usage
//!
//! ```bash
//! # Stream a test pattern to an RTMP endpoint
//! beamcast stream --url rtmp://localhost/live/key
//!
//! # Show which encoders the codec runtime exposes
//! beamcast info
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Beamcast - live camera-to-RTMP streaming
#[derive(Parser)]
#[command(name = "beamcast")]
#[command(version)]
#[command(about = "Live camera-to-RTMP streaming session orchestration", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live streaming session until Ctrl-C (or --duration)
    Stream(commands::StreamArgs),

    /// Show encoder availability in the codec runtime
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("beamcast={}", level).parse().unwrap()),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Stream(args) => commands::stream(args).await?,
        Commands::Info => commands::info()?,
    }

    Ok(())
}
