//! CORS relay in front of the upstream feed
//!
//! Browsers cannot call the upstream endpoints directly, and the secondary
//! one only serves HTML. The relay fetches both server-side and exposes them
//! as plain JSON:
//!
//! - `GET /api/primary` - upstream JSON passed through
//! - `GET /api/fallback` - embedded JSON extracted from the upstream page
//! - `GET /health` - liveness
//!
//! Pointing `source.primary_url`/`source.secondary_url` at a relay with
//! `browser_headers = false` lets the ingester run without spoofed headers.

pub mod api;

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::models::{Batch, Endpoint};
use crate::parser;
use crate::source::headers::{self, DESKTOP_USER_AGENT};
use crate::utils::error::{FetchError, ParseError};

pub use api::create_router;

// ============================================================================
// Errors
// ============================================================================

/// Why a relay request could not be served
#[derive(Error, Debug)]
pub enum RelayError {
    /// Local upstream budget exhausted
    #[error("Relay upstream rate limit exceeded")]
    Throttled,

    /// Upstream request or payload failed
    #[error("{0}")]
    Upstream(#[from] FetchError),
}

// ============================================================================
// Relay State
// ============================================================================

/// One upstream the relay forwards to
#[derive(Debug, Clone)]
pub struct Upstream {
    pub endpoint: Endpoint,
    pub url: String,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

/// Shared state for relay handlers
#[derive(Clone)]
pub struct RelayState {
    client: Client,
    primary: Arc<Upstream>,
    fallback: Arc<Upstream>,

    /// Shared budget for upstream requests across both routes
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,

    pub start_time: Instant,
}

impl RelayState {
    /// Build the state from relay configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the header profiles cannot be built
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let client = Client::builder().gzip(true).build()?;

        let per_minute = NonZeroU32::new(config.upstream_requests_per_minute)
            .ok_or_else(|| Error::config("upstream_requests_per_minute must be greater than 0"))?;
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        let primary = Upstream {
            endpoint: Endpoint::Primary,
            url: config.primary_upstream.clone(),
            headers: headers::build_browser_headers(DESKTOP_USER_AGENT, headers::ACCEPT_JSON)?,
            timeout: Duration::from_secs(config.primary_timeout_secs),
        };
        let fallback = Upstream {
            endpoint: Endpoint::Secondary,
            url: config.fallback_upstream.clone(),
            headers: headers::build_browser_headers(DESKTOP_USER_AGENT, headers::ACCEPT_HTML)?,
            timeout: Duration::from_secs(config.fallback_timeout_secs),
        };

        Ok(Self {
            client,
            primary: Arc::new(primary),
            fallback: Arc::new(fallback),
            limiter: Arc::new(limiter),
            start_time: Instant::now(),
        })
    }

    /// Fetch the primary upstream and return its JSON body
    pub async fn relay_primary(&self) -> std::result::Result<Value, RelayError> {
        let body = self.fetch_upstream(&self.primary).await?;

        serde_json::from_str(&body).map_err(|e| {
            FetchError::parse(self.primary.endpoint, 200, ParseError::InvalidJson(e)).into()
        })
    }

    /// Fetch the fallback page and return the batch JSON embedded in it
    ///
    /// The extracted value is checked against the batch shape but returned
    /// as-is, unknown fields included.
    pub async fn relay_fallback(&self) -> std::result::Result<Value, RelayError> {
        let endpoint = self.fallback.endpoint;
        let body = self.fetch_upstream(&self.fallback).await?;

        let json = parser::extract_embedded_json(&body)
            .map_err(|e| FetchError::parse(endpoint, 200, e))?;
        let value: Value = serde_json::from_str(&json)
            .map_err(|e| FetchError::parse(endpoint, 200, ParseError::InvalidJson(e)))?;
        serde_json::from_value::<Batch>(value.clone())
            .map_err(|e| FetchError::parse(endpoint, 200, ParseError::InvalidJson(e)))?;

        Ok(value)
    }

    async fn fetch_upstream(&self, upstream: &Upstream) -> std::result::Result<String, RelayError> {
        if self.limiter.check().is_err() {
            tracing::warn!(endpoint = %upstream.endpoint, "Relay upstream budget exhausted");
            return Err(RelayError::Throttled);
        }

        tracing::debug!(endpoint = %upstream.endpoint, url = %upstream.url, "Relaying upstream request");

        let response = self
            .client
            .get(&upstream.url)
            .headers(upstream.headers.clone())
            .timeout(upstream.timeout)
            .send()
            .await
            .map_err(|e| FetchError::transport(upstream.endpoint, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(upstream.endpoint, status.as_u16()).into());
        }

        Ok(response
            .text()
            .await
            .map_err(|e| FetchError::transport(upstream.endpoint, &e))?)
    }
}

// ============================================================================
// Relay Server
// ============================================================================

/// HTTP server exposing the relay routes
pub struct RelayServer {
    config: RelayConfig,
    state: RelayState,
}

impl RelayServer {
    /// Create a new relay server
    pub fn new(config: RelayConfig) -> Result<Self> {
        let state = RelayState::from_config(&config)?;
        Ok(Self { config, state })
    }

    /// Get the relay state
    pub fn state(&self) -> RelayState {
        self.state.clone()
    }

    /// Build the router with CORS and request tracing
    pub fn build_router(&self) -> Router {
        create_router(self.state.clone())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
    }

    /// Address from the configured host and port
    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid relay bind address: {e}")))
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = self.bind_address()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!(
            %addr,
            primary = %self.config.primary_upstream,
            fallback = %self.config.fallback_upstream,
            "Starting relay server"
        );

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        tracing::info!("Relay server shutdown complete");
        Ok(())
    }
}
