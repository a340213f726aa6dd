//! # liveframe
//!
//! Serves the demo components over WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! liveframe
//!
//! # Run with environment variables
//! LIVEFRAME_PORT=8080 LIVEFRAME_HOST=0.0.0.0 LIVEFRAME_SIGNING_SECRET=... liveframe
//! ```

use anyhow::Result;
use liveframe_server::{config::Config, demo, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "liveframe=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!("Starting liveframe server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    let routes = demo::routes();
    tracing::info!(routes = ?routes.paths().collect::<Vec<_>>(), "Mounted components");
    handlers::run_server(config, routes).await?;

    Ok(())
}
