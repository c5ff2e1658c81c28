//! Upstream source access
//!
//! - [`client`] - single-attempt fetch against one endpoint
//! - [`failover`] - primary/secondary orchestration with backoff
//! - [`headers`] - browser header profiles

pub mod client;
pub mod failover;
pub mod headers;

use reqwest::header::HeaderMap;

use crate::config::SourceConfig;
use crate::error::Result;
use crate::models::Endpoint;

pub use client::SourceClient;
pub use failover::{EndpointState, FailoverFetcher, FailoverPolicy, FetchedBatch, Transition};

/// One configured endpoint: identity, URL and the headers sent with it
#[derive(Debug, Clone)]
pub struct EndpointTarget {
    pub endpoint: Endpoint,
    pub url: String,
    pub headers: HeaderMap,
}

impl EndpointTarget {
    /// Create a target with no extra headers
    pub fn new(endpoint: Endpoint, url: impl Into<String>) -> Self {
        Self {
            endpoint,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Replace the request headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Build the primary and secondary targets from configuration
    ///
    /// The primary gets the JSON header profile and the secondary the HTML
    /// one. With `browser_headers` disabled only the configured extra headers
    /// are sent.
    pub fn from_config(config: &SourceConfig) -> Result<(Self, Self)> {
        let profile = |accept: &'static str| -> Result<HeaderMap> {
            let mut headers = if config.browser_headers {
                headers::build_browser_headers(&config.user_agent, accept)?
            } else {
                HeaderMap::new()
            };
            headers::apply_extra_headers(&mut headers, &config.extra_headers)?;
            Ok(headers)
        };

        let primary = Self::new(Endpoint::Primary, &config.primary_url)
            .with_headers(profile(headers::ACCEPT_JSON)?);
        let secondary = Self::new(Endpoint::Secondary, &config.secondary_url)
            .with_headers(profile(headers::ACCEPT_HTML)?);

        Ok((primary, secondary))
    }
}
