//! Process bootstrap: CLI, configuration, logging, listeners.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use echoprint::analytics::Analytics;
use echoprint::config::Config;
use echoprint::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "echoprint", about = "TLS/HTTP fingerprinting echo service")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: String,
}

#[tokio::main]
async fn main() -> echoprint::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let analytics = if config.analytics_enabled() {
        match Analytics::connect(&config).await {
            Ok(analytics) => {
                info!(database = %config.mongo_database, "analytics sink connected");
                Some(analytics)
            }
            Err(e) => {
                warn!("analytics sink unavailable, continuing without: {}", e);
                None
            }
        }
    } else {
        None
    };

    if !config.device.is_empty() {
        info!(device = %config.device, "packet capture is handled externally");
    }

    let state = Arc::new(AppState::new(config, analytics));
    server::run(state).await
}
