//! mission-control - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the agent/trace API and change stream.

use mission_control::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mission_control=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: gateway={}, sync={}",
        config
            .gateway
            .url
            .as_ref()
            .map(|url| url.as_str())
            .unwrap_or("(simulated)"),
        config.gateway.sync_active()
    );

    info!("Starting server on {}", config.bind_addr());
    api::serve(config).await?;

    Ok(())
}
