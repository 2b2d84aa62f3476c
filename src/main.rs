//! Room Broadcast Server - Entry Point
//!
//! Starts the room registry and the TCP listener, accepting connections.

use std::env;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use room_relay::{serve, Hub, HubConfig};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("room_relay=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let config = HubConfig::default();
    let endpoint = config.endpoint.clone();
    let hub = Hub::new(config)?;

    let listener = TcpListener::bind(&addr).await?;
    info!("Room broadcast server listening on ws://{}{}", addr, endpoint);

    serve(listener, hub).await;
    Ok(())
}
