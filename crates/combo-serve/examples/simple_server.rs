//! Simple combo server example.
//!
//! This example serves a temporary directory with a few assets and an
//! index database.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example simple_server
//! ```
//!
//! Then test with:
//! ```bash
//! # Explicit file list
//! curl -i 'http://localhost:8080/js/??core.js,widgets.js'
//!
//! # Index database, binary 101 selects entries 0 and 2
//! curl -i 'http://localhost:8080/js/bundle.json~5.js'
//!
//! # Plain static file
//! curl -i 'http://localhost:8080/js/core.js'
//! ```

#![allow(clippy::expect_used)]

use anyhow::Result;
use combo_serve::{Bitmask, Server, ServerConfig};
use tempfile::TempDir;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    // Sample assets
    let root = TempDir::new()?;
    let js = root.path().join("js");
    std::fs::create_dir_all(&js)?;
    std::fs::write(js.join("core.js"), "window.core = {};\n")?;
    std::fs::write(js.join("widgets.js"), "core.widgets = [];\n")?;
    std::fs::write(js.join("app.js"), "core.start();\n")?;
    std::fs::write(
        js.join("bundle.json"),
        r#"["js/core.js", "js/widgets.js", "js/app.js"]"#,
    )?;

    let config = ServerConfig {
        bind: "127.0.0.1:8080".parse()?,
        root: root.path().to_path_buf(),
        max_age: 3600,
        no_db_parser: false,
        no_multi_parser: false,
        chunk_size: 64 * 1024,
        tls_cert: None,
        tls_key: None,
    };

    let server = Server::new(config)?;

    let token = Bitmask::from_indices(3, [0, 2]).to_token();
    tracing::info!("Starting simple combo server");
    tracing::info!("Try: http://127.0.0.1:8080/js/??core.js,widgets.js");
    tracing::info!("Try: http://127.0.0.1:8080/js/bundle.json~{}.js", token);
    tracing::info!("Press Ctrl+C to stop");

    server.run().await?;

    Ok(())
}
