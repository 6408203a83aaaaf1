//! Combo request handling.
//!
//! [`ComboHandler`] runs in front of another service as axum middleware:
//! requests that are not GET, or whose URL neither parser recognizes, are
//! passed to the next service untouched.

use crate::checker::{PathChecker, RootChecker};
use crate::combine::Combination;
use crate::config::ComboOptions;
use crate::database::{DbFileResolver, IndexResolver};
use crate::error::{CheckError, ComboError};
use crate::headers::set_headers;
use crate::parser::{ComboRequest, DbFilesParser, DbParser, MultiFilesParser, MultiParser};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

/// Combines files for matching requests and defers everything else.
pub struct ComboHandler {
    options: ComboOptions,
    multi_parser: Arc<dyn MultiParser>,
    db_parser: Arc<dyn DbParser>,
    resolver: Arc<dyn IndexResolver>,
    checker: Arc<dyn PathChecker>,
}

impl std::fmt::Debug for ComboHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComboHandler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ComboHandler {
    /// Handler with the built-in parsers, resolver and checker.
    #[must_use]
    pub fn new(options: ComboOptions) -> Self {
        Self::builder(options).build()
    }

    /// Builder for overriding individual collaborators.
    #[must_use]
    pub fn builder(options: ComboOptions) -> ComboHandlerBuilder {
        ComboHandlerBuilder {
            options,
            multi_parser: None,
            db_parser: None,
            resolver: None,
            checker: None,
        }
    }

    /// Handler options.
    #[must_use]
    pub const fn options(&self) -> &ComboOptions {
        &self.options
    }

    /// Resolve `url` into a combo request.
    ///
    /// Both URL styles are attempted concurrently; a database match wins
    /// over a multi-file match. Parse and resolve failures are logged and
    /// yield `None`.
    pub async fn resolve(&self, url: &str) -> Option<ComboRequest> {
        let (from_db, from_multi) = tokio::join!(self.parse_db(url), self.parse_multi(url));
        from_db.or(from_multi)
    }

    async fn parse_db(&self, url: &str) -> Option<ComboRequest> {
        if !self.options.enabled_db_parser {
            return None;
        }

        let reference = match self.db_parser.parse(url) {
            Ok(reference) => reference?,
            Err(e) => {
                tracing::debug!("DB parse error for {}: {}", url, e);
                return None;
            }
        };
        tracing::debug!("DB reference: {:?}", reference);

        match self
            .resolver
            .resolve(&self.options.root, &reference.db, &reference.token)
            .await
        {
            Ok(files) => Some(ComboRequest {
                files,
                root: self.options.root.clone(),
                resource: reference.resource,
            }),
            Err(e) => {
                tracing::debug!("DB resolve error for {}: {}", url, e);
                None
            }
        }
    }

    async fn parse_multi(&self, url: &str) -> Option<ComboRequest> {
        if !self.options.enabled_multi_parser {
            return None;
        }

        match self.multi_parser.parse(url) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Multi-file parse error for {}: {}", url, e);
                None
            }
        }
    }

    /// Validate the request's files and build a streaming response.
    ///
    /// Headers are derived from file stats before the body is produced.
    ///
    /// # Errors
    ///
    /// Returns `ComboError` if a file fails validation or cannot be stat'ed.
    pub async fn respond(&self, request: &ComboRequest) -> Result<Response, ComboError> {
        tracing::debug!("Checking files: {:?}", request.files);
        self.checker.check(&request.root, &request.files).await?;

        let started_at = Instant::now();
        let combination = Combination::open(&request.files, self.options.chunk_size).await?;
        tracing::debug!(
            "Combo stats for {} files in {}ms",
            combination.stats().stats.len(),
            started_at.elapsed().as_millis()
        );

        let mut response = Response::new(Body::empty());
        set_headers(
            response.headers_mut(),
            combination.stats(),
            &request.resource,
            self.options.max_age,
        );
        *response.body_mut() = Body::from_stream(combination.into_stream());

        Ok(response)
    }

    /// Serve `req` as a combo if it matches, otherwise run `next`.
    pub async fn handle(&self, req: Request, next: Next) -> Response {
        if *req.method() != Method::GET {
            return next.run(req).await;
        }

        let url = req
            .uri()
            .path_and_query()
            .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string());
        tracing::debug!("Combo start: {}", url);

        let Some(request) = self.resolve(&url).await else {
            return next.run(req).await;
        };

        match self.respond(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Combo error for {}: {}", url, e);
                e.into_response()
            }
        }
    }
}

/// Builder for [`ComboHandler`].
pub struct ComboHandlerBuilder {
    options: ComboOptions,
    multi_parser: Option<Arc<dyn MultiParser>>,
    db_parser: Option<Arc<dyn DbParser>>,
    resolver: Option<Arc<dyn IndexResolver>>,
    checker: Option<Arc<dyn PathChecker>>,
}

impl ComboHandlerBuilder {
    /// Replace the multi-file URL parser.
    #[must_use]
    pub fn multi_parser(mut self, parser: Arc<dyn MultiParser>) -> Self {
        self.multi_parser = Some(parser);
        self
    }

    /// Replace the database-reference URL parser.
    #[must_use]
    pub fn db_parser(mut self, parser: Arc<dyn DbParser>) -> Self {
        self.db_parser = Some(parser);
        self
    }

    /// Replace the database resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn IndexResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replace the path checker.
    #[must_use]
    pub fn checker(mut self, checker: Arc<dyn PathChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Build the handler, filling unset collaborators with defaults.
    #[must_use]
    pub fn build(self) -> ComboHandler {
        let root = self.options.root.clone();
        ComboHandler {
            multi_parser: self
                .multi_parser
                .unwrap_or_else(|| Arc::new(MultiFilesParser::new(root))),
            db_parser: self
                .db_parser
                .unwrap_or_else(|| Arc::new(DbFilesParser::new())),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(DbFileResolver::default())),
            checker: self
                .checker
                .unwrap_or_else(|| Arc::new(RootChecker::new())),
            options: self.options,
        }
    }
}

/// Axum middleware entry point.
pub async fn combo_middleware(
    State(handler): State<Arc<ComboHandler>>,
    req: Request,
    next: Next,
) -> Response {
    handler.handle(req, next).await
}

impl IntoResponse for ComboError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Check(CheckError::NotFound(_) | CheckError::NotAFile(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Check(CheckError::OutsideRoot(_)) => StatusCode::FORBIDDEN,
            Self::Check(CheckError::Io { .. }) | Self::Stream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}
