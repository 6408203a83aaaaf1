//! Server state management and orchestration.
//!
//! Holds the combo handler and the process-wide index database cache
//! shared by every request.

use crate::config::{ComboOptions, ServerConfig};
use crate::database::{DatabaseCache, DbFileResolver};
use crate::error::ServerError;
use crate::http::ComboHandler;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Combo request handler
    handler: Arc<ComboHandler>,

    /// Index databases, shared across requests
    database_cache: Arc<DatabaseCache>,

    /// Server start time
    started_at: SystemTime,
}

impl AppState {
    /// Create application state from handler options.
    #[must_use]
    pub fn new(options: ComboOptions) -> Self {
        let database_cache = Arc::new(DatabaseCache::new());
        let handler = ComboHandler::builder(options)
            .resolver(Arc::new(DbFileResolver::new(Arc::clone(&database_cache))))
            .build();

        Self {
            handler: Arc::new(handler),
            database_cache,
            started_at: SystemTime::now(),
        }
    }

    /// Get the combo handler.
    #[must_use]
    pub const fn handler(&self) -> &Arc<ComboHandler> {
        &self.handler
    }

    /// Get the index database cache.
    #[must_use]
    pub const fn database_cache(&self) -> &Arc<DatabaseCache> {
        &self.database_cache
    }

    /// Root directory being served.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.handler.options().root
    }

    /// Get server uptime in seconds.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.started_at)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Server orchestration.
#[derive(Debug)]
pub struct Server {
    /// Shared application state
    state: Arc<AppState>,
    /// Server configuration
    config: ServerConfig,
}

impl Server {
    /// Create new server with configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the configuration is invalid.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let state = AppState::new(config.combo_options());

        tracing::info!(
            "Server initialized for root {} (max-age {}s)",
            state.root().display(),
            state.handler().options().max_age
        );

        Ok(Self {
            state: Arc::new(state),
            config,
        })
    }

    /// Run the server until interrupted or an error occurs.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if server binding fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Starting combo server");
        tracing::info!("HTTP server binding to: {}", self.config.bind);

        let state = Arc::clone(&self.state);
        let bind = self.config.bind;

        let mut http_server = if self.config.has_tls() {
            self.spawn_tls(bind, state)?
        } else {
            tracing::info!("TLS disabled (HTTP only)");
            tokio::spawn(crate::http::start_server(bind, state))
        };

        tokio::select! {
            result = &mut http_server => {
                return result
                    .map_err(|e| ServerError::Shutdown(format!("HTTP server task failed: {e}")))?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| {
                    ServerError::Shutdown(format!("Failed to listen for shutdown signal: {e}"))
                })?;
            }
        }

        tracing::info!(
            "Shutdown signal received, stopping server after {}s",
            self.state.uptime_seconds()
        );
        http_server.abort();

        Ok(())
    }

    #[cfg(feature = "tls")]
    fn spawn_tls(
        &self,
        bind: std::net::SocketAddr,
        state: Arc<AppState>,
    ) -> Result<tokio::task::JoinHandle<Result<(), ServerError>>, ServerError> {
        let (Some(cert), Some(key)) = (self.config.tls_cert.clone(), self.config.tls_key.clone())
        else {
            return Err(crate::error::ConfigError::TlsConfig(
                "TLS certificate and key are both required".to_string(),
            )
            .into());
        };

        tracing::info!("TLS enabled with cert: {:?}", cert);
        Ok(tokio::spawn(async move {
            crate::http::start_tls_server(bind, state, &cert, &key).await
        }))
    }

    #[cfg(not(feature = "tls"))]
    fn spawn_tls(
        &self,
        _bind: std::net::SocketAddr,
        _state: Arc<AppState>,
    ) -> Result<tokio::task::JoinHandle<Result<(), ServerError>>, ServerError> {
        Err(crate::error::ConfigError::TlsConfig(
            "TLS certificate configured but the server was built without the `tls` feature"
                .to_string(),
        )
        .into())
    }

    /// Get shared application state (for testing).
    #[cfg(test)]
    #[must_use]
    pub const fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            root: root.to_path_buf(),
            max_age: 120,
            no_db_parser: false,
            no_multi_parser: false,
            chunk_size: 4096,
            tls_cert: None,
            tls_key: None,
        }
    }

    #[test]
    fn test_app_state_creation() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(ComboOptions::new(dir.path()));
        assert_eq!(state.root(), dir.path());
        assert!(state.database_cache().is_empty());
    }

    #[test]
    fn test_server_new() {
        let dir = TempDir::new().unwrap();
        let server = Server::new(test_config(dir.path())).unwrap();
        assert_eq!(server.state().handler().options().max_age, 120);
        assert_eq!(server.state().handler().options().chunk_size, 4096);
    }

    #[test]
    fn test_server_rejects_invalid_root() {
        let dir = TempDir::new().unwrap();
        let err = Server::new(test_config(&dir.path().join("missing"))).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn test_server_debug_output() {
        let dir = TempDir::new().unwrap();
        let server = Server::new(test_config(dir.path())).unwrap();
        let rendered = format!("{server:?}");
        assert!(rendered.starts_with("Server"));
        assert!(rendered.contains("started_at"));
    }

    #[test]
    fn test_uptime() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(ComboOptions::new(dir.path()));
        assert!(state.uptime_seconds() <= 1);
    }
}
