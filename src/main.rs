//! Counter app server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - COUNTER_HOST: Bind address (default: 0.0.0.0)
//! - COUNTER_PORT: Port number (default: 8080)
//! - RUST_LOG: Log level (default: info)

use counterwatch::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counterwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid server configuration");
            std::process::exit(1);
        }
    };

    tracing::info!("Counter app configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Version: {}", env!("CARGO_PKG_VERSION"));

    run_server(config).await
}
