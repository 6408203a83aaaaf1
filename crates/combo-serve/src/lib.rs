//! Static file combo server.
//!
//! This crate serves several static files as one HTTP response. Files are
//! addressed either by an explicit list (`/js/??a.js,b.js`) or by a
//! compact bitmask token against an index database (`/db.json~3.js`).
//! The combined body is streamed file by file while `Content-Length`,
//! `Last-Modified` and `ETag` are computed up front from file stats.
//!
//! # Architecture
//!
//! - `parser`: URL shape recognition for both request styles
//! - `codec`: radix-32 bitmask tokens
//! - `database`: index database loading and mtime-invalidated caching
//! - `checker`: root containment and existence checks
//! - `combine`: stats collection and the concatenated body stream
//! - `headers`: caching and entity header derivation
//! - `http`: axum middleware, router and server
//! - `server`: shared state and orchestration
//! - `config`: CLI and environment configuration
//!
//! # Example
//!
//! ```no_run
//! use combo_serve::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tracing_subscriber::fmt::init();
//!
//!     let config = ServerConfig::from_args();
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The handler can also sit in front of any other axum service:
//!
//! ```no_run
//! use axum::{Router, middleware, routing::get};
//! use combo_serve::{ComboHandler, ComboOptions, http::combo_middleware};
//! use std::sync::Arc;
//!
//! let handler = Arc::new(ComboHandler::new(ComboOptions::new("./public")));
//! let app: Router = Router::new()
//!     .route("/health", get(|| async { "ok" }))
//!     .layer(middleware::from_fn_with_state(handler, combo_middleware));
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod checker;
pub mod codec;
pub mod combine;
pub mod config;
pub mod database;
pub mod error;
pub mod headers;
pub mod http;
pub mod parser;
pub mod server;

pub use checker::{PathChecker, RootChecker};
pub use codec::{Bitmask, DecodedSelection, decode};
pub use combine::{ComboStream, Combination, FileStat, StatsBundle, combine};
pub use config::{ComboOptions, ServerConfig};
pub use database::{DatabaseCache, DbFileResolver, FileEntry, IndexDatabase, IndexResolver};
pub use error::{
    CheckError, ComboError, ConfigError, DatabaseError, DecodeError, ParseError, ServerError,
    StreamError,
};
pub use http::{ComboHandler, ComboHandlerBuilder};
pub use parser::{ComboRequest, DbFilesParser, DbParser, DbReference, MultiFilesParser, MultiParser};
pub use server::{AppState, Server};
