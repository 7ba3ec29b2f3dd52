//! # LinkPulse Server
//!
//! Realtime analytics broadcast server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! linkpulse
//!
//! # Run with a custom config file
//! linkpulse /path/to/linkpulse.toml
//!
//! # Run with environment variables
//! LINKPULSE__PORT=8080 LINKPULSE__HOST=0.0.0.0 linkpulse
//! ```

use anyhow::Result;
use linkpulse_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkpulse=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    tracing::info!("Starting LinkPulse server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
