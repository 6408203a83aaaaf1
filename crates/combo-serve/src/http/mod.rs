//! HTTP/HTTPS server implementation using axum.

use crate::error::ServerError;
use crate::server::AppState;
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod handlers;

pub use handlers::{ComboHandler, ComboHandlerBuilder, combo_middleware};

/// Create the HTTP router: combo middleware in front of a static file
/// service rooted at the same directory.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(state.root()))
        .layer(middleware::from_fn_with_state(
            Arc::clone(state.handler()),
            combo_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start HTTP server.
///
/// # Errors
///
/// Returns `ServerError` if the server fails to bind or encounters a runtime error.
pub async fn start_server(bind_addr: SocketAddr, state: Arc<AppState>) -> Result<(), ServerError> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ServerError::HttpBindFailed {
            addr: bind_addr,
            source,
        })?;

    tracing::info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Shutdown(format!("HTTP server error: {e}")))?;

    Ok(())
}

/// Start HTTPS server.
///
/// # Errors
///
/// Returns `ServerError` if the certificate cannot be loaded or the server fails.
#[cfg(feature = "tls")]
pub async fn start_tls_server(
    bind_addr: SocketAddr,
    state: Arc<AppState>,
    cert: &std::path::Path,
    key: &std::path::Path,
) -> Result<(), ServerError> {
    use crate::error::ConfigError;
    use axum_server::tls_rustls::RustlsConfig;

    // Installing twice is harmless; the first provider stays
    let _ = rustls::crypto::ring::default_provider().install_default();

    let tls_config = RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(|e| ConfigError::TlsConfig(format!("failed to load certificate: {e}")))?;

    let app = create_router(state);
    tracing::info!("HTTPS server listening on {}", bind_addr);

    axum_server::bind_rustls(bind_addr, tls_config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| ServerError::Shutdown(format!("HTTPS server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComboOptions;

    #[test]
    fn test_router_creation() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = Arc::new(AppState::new(ComboOptions::new(dir.path())));
        let _router = create_router(state);

        // Test passes if router creation succeeds without panic
    }
}
