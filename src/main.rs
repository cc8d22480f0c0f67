//! Main entry point for the osu-data-downloader CLI

use clap::Parser;
use osu_data_downloader::cli::Cli;
use osu_data_downloader::metrics;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("osu_data_downloader=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr).await {
            warn!(error = %e, "Metrics exporter unavailable, continuing without it");
        }
    }

    if let Err(e) = cli.execute().await {
        let code = e.exit_code();
        error!("Command failed: {:#}", anyhow::anyhow!(e));
        std::process::exit(code);
    }
}
