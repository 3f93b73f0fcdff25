use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use meshstream::log_format::CompactTargetFormat;

mod commands;

#[derive(Parser)]
#[command(name = "meshstream")]
#[command(about = "Follow a Meshtastic MQTT bridge stream and aggregate the mesh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live packets, logging a network summary periodically
    Watch {
        /// SSE endpoint (overrides config file and MESHSTREAM_ENDPOINT)
        #[arg(long)]
        endpoint: Option<String>,

        /// Path to meshstream.toml (defaults to MESHSTREAM_CONFIG, then ./meshstream.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seconds between summary log lines
        #[arg(long, default_value = "60")]
        summary_interval: u64,

        /// Serve Prometheus metrics on this port
        #[arg(long)]
        metrics_port: Option<u16>,
    },
    /// Fold a JSONL packet capture and print the resulting tables as JSON
    Replay {
        /// Capture file, one packet per line
        file: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .event_format(CompactTargetFormat::new())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            endpoint,
            config,
            summary_interval,
            metrics_port,
        } => commands::handle_watch(endpoint, config, summary_interval, metrics_port).await,
        Commands::Replay { file, pretty } => commands::handle_replay(file, pretty),
    }
}
