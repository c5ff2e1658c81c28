//! Single-attempt HTTP client for the upstream feed
//!
//! [`SourceClient`] performs exactly one request per call and turns the
//! response into either a [`Batch`] or a typed [`FetchError`]. Retry and
//! failover policy lives one level up, in [`super::failover`].

use std::time::Duration;

use reqwest::Client;

use crate::error::Result;
use crate::models::Batch;
use crate::parser;
use crate::utils::error::FetchError;

use super::EndpointTarget;

/// HTTP client performing one fetch attempt per call
#[derive(Debug, Clone)]
pub struct SourceClient {
    client: Client,
}

impl SourceClient {
    /// Create a client without a request timeout
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the HTTP client cannot be created
    pub fn new() -> Result<Self> {
        Self::with_timeout(None)
    }

    /// Create a client with an optional request timeout
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the HTTP client cannot be created
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().gzip(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Fetch one batch from `target`
    ///
    /// Status mapping:
    /// - 2xx with a batch payload (JSON or HTML-embedded) -> `Ok(Batch)`
    /// - 403 -> `Blocked`, 429 -> `RateLimited`, other non-2xx -> `HttpError`
    /// - 2xx with an unparseable payload -> `ParseError`
    /// - transport failure -> `HttpError` without a status
    pub async fn fetch(&self, target: &EndpointTarget) -> std::result::Result<Batch, FetchError> {
        tracing::debug!(endpoint = %target.endpoint, url = %target.url, "Fetching batch");

        let response = self
            .client
            .get(&target.url)
            .headers(target.headers.clone())
            .send()
            .await
            .map_err(|e| FetchError::transport(target.endpoint, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(target.endpoint, status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(target.endpoint, &e))?;

        let batch = parser::parse_payload(&body)
            .map_err(|e| FetchError::parse(target.endpoint, status.as_u16(), e))?;

        tracing::debug!(
            endpoint = %target.endpoint,
            events = batch.len(),
            "Batch received"
        );

        Ok(batch)
    }
}
