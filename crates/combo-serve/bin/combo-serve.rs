//! Combo server binary entry point.
//!
//! This is a thin wrapper around the combo-serve library that:
//! 1. Initializes logging
//! 2. Parses command-line arguments
//! 3. Validates configuration
//! 4. Starts the server

use anyhow::Result;
use combo_serve::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_args();

    tracing::info!(
        "Configuration loaded: bind={}, root={:?}, max_age={}",
        config.bind,
        config.root,
        config.max_age
    );

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
