//! Server and handler configuration.
//!
//! This module handles loading and validating configuration from CLI arguments
//! and environment variables.
//!
//! # Configuration Sources
//!
//! Configuration can be provided via:
//! - CLI arguments (`--bind`, `--root`, `--max-age`, etc.)
//! - Environment variables (`COMBO_SERVE_BIND`, etc.)
//! - Default values
//!
//! # Example
//!
//! ```no_run
//! use combo_serve::ServerConfig;
//!
//! let config = ServerConfig::from_args();
//! config.validate().expect("Invalid configuration");
//!
//! println!("Serving {} on {}", config.root.display(), config.bind);
//! ```

use crate::combine::DEFAULT_CHUNK_SIZE;
use crate::error::ConfigError;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default `Cache-Control` max-age: one year.
pub const DEFAULT_MAX_AGE: u64 = 365 * 24 * 3600;

/// Server configuration loaded from CLI args and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "combo-serve",
    about = "Serve combined static files from compact combo URLs",
    version
)]
pub struct ServerConfig {
    /// HTTP/HTTPS bind address
    #[arg(long, env = "COMBO_SERVE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Directory served and combined from
    #[arg(long, env = "COMBO_SERVE_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Cache-Control max-age in seconds (negative values become 0)
    #[arg(
        long,
        env = "COMBO_SERVE_MAX_AGE",
        default_value_t = 31_536_000,
        allow_negative_numbers = true
    )]
    pub max_age: i64,

    /// Disable `<db>~<token>` URLs
    #[arg(long, env = "COMBO_SERVE_NO_DB_PARSER")]
    pub no_db_parser: bool,

    /// Disable `??a,b,c` URLs
    #[arg(long, env = "COMBO_SERVE_NO_MULTI_PARSER")]
    pub no_multi_parser: bool,

    /// Read chunk size in bytes
    #[arg(long, env = "COMBO_SERVE_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// TLS certificate file path (optional, enables HTTPS)
    #[arg(long, env = "COMBO_SERVE_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key file path (required if `tls_cert` is set)
    #[arg(long, env = "COMBO_SERVE_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
}

impl ServerConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Check if TLS is configured.
    #[must_use]
    pub const fn has_tls(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }

    /// Handler options derived from this configuration.
    #[must_use]
    pub fn combo_options(&self) -> ComboOptions {
        ComboOptions::new(&self.root)
            .with_max_age(self.max_age)
            .with_db_parser(!self.no_db_parser)
            .with_multi_parser(!self.no_multi_parser)
            .with_chunk_size(self.chunk_size)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Root doesn't exist or isn't a directory
    /// - Chunk size is zero
    /// - TLS cert is provided without key (or vice versa)
    /// - TLS cert/key files don't exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root.is_dir() {
            return Err(ConfigError::InvalidRoot {
                path: self.root.clone(),
                reason: if self.root.exists() {
                    "not a directory".to_string()
                } else {
                    "does not exist".to_string()
                },
            });
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunk_size",
                reason: "must be greater than zero".to_string(),
            });
        }

        match (&self.tls_cert, &self.tls_key) {
            (Some(_cert), None) => {
                return Err(ConfigError::TlsConfig(
                    "TLS certificate provided without private key".to_string(),
                ));
            }
            (None, Some(_key)) => {
                return Err(ConfigError::TlsConfig(
                    "TLS private key provided without certificate".to_string(),
                ));
            }
            (Some(cert), Some(key)) => {
                if !cert.exists() {
                    return Err(ConfigError::TlsConfig(format!(
                        "TLS certificate file not found: {}",
                        cert.display()
                    )));
                }
                if !key.exists() {
                    return Err(ConfigError::TlsConfig(format!(
                        "TLS private key file not found: {}",
                        key.display()
                    )));
                }
            }
            (None, None) => {}
        }

        Ok(())
    }
}

/// Options for the combo handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboOptions {
    /// Absolute root directory
    pub root: PathBuf,
    /// Cache-Control max-age in seconds
    pub max_age: u64,
    /// Try `<db>~<token>` URLs
    pub enabled_db_parser: bool,
    /// Try `??a,b,c` URLs
    pub enabled_multi_parser: bool,
    /// Read chunk size in bytes
    pub chunk_size: usize,
}

impl Default for ComboOptions {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ComboOptions {
    /// Options for `root` with both parsers enabled. A relative root is
    /// resolved against the current working directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);

        Self {
            root,
            max_age: DEFAULT_MAX_AGE,
            enabled_db_parser: true,
            enabled_multi_parser: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set max-age; negative values are floored to zero.
    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = u64::try_from(seconds).unwrap_or(0);
        self
    }

    /// Enable or disable database-reference URLs.
    #[must_use]
    pub const fn with_db_parser(mut self, enabled: bool) -> Self {
        self.enabled_db_parser = enabled;
        self
    }

    /// Enable or disable multi-file URLs.
    #[must_use]
    pub const fn with_multi_parser(mut self, enabled: bool) -> Self {
        self.enabled_multi_parser = enabled;
        self
    }

    /// Set the read chunk size (at least one byte).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}
