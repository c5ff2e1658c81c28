//! Error types for the flashfeed ingester
//!
//! This module defines the fetch and parse error taxonomy shared by the
//! source client, the failover fetcher and the relay server.

use std::fmt;

use thiserror::Error;

use crate::models::Endpoint;

/// Classification of a failed fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Upstream answered 429 Too Many Requests
    RateLimited,
    /// Upstream answered 403 Forbidden
    Blocked,
    /// Any other non-2xx status, or a transport failure without a status
    HttpError,
    /// The payload did not match the expected batch shape
    ParseError,
}

impl FetchErrorKind {
    /// Map a non-success HTTP status code to its error kind
    pub fn from_status(status: u16) -> Self {
        match status {
            403 => Self::Blocked,
            429 => Self::RateLimited,
            _ => Self::HttpError,
        }
    }

    /// Stable lowercase label, used for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Blocked => "blocked",
            Self::HttpError => "http_error",
            Self::ParseError => "parse_error",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while parsing an upstream payload
#[derive(Error, Debug)]
pub enum ParseError {
    /// Payload is not valid batch JSON
    #[error("Invalid batch JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// HTML page does not contain the embedded data assignment
    #[error("Embedded flash data not found in HTML")]
    EmbeddedDataNotFound,

    /// Summary counter is not a whitespace-grouped integer
    #[error("Invalid count value: {0:?}")]
    InvalidCount(String),
}

/// A single failed fetch attempt against one endpoint
#[derive(Error, Debug)]
#[error("{kind} on {endpoint}{}: {message}", status_suffix(.status))]
pub struct FetchError {
    /// Which endpoint the attempt targeted
    pub endpoint: Endpoint,

    /// Error classification
    pub kind: FetchErrorKind,

    /// HTTP status code, when the upstream answered at all
    pub status: Option<u16>,

    /// Human readable detail
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl FetchError {
    /// Create an error for a non-success HTTP status
    pub fn from_status(endpoint: Endpoint, status: u16) -> Self {
        let kind = FetchErrorKind::from_status(status);
        let message = match kind {
            FetchErrorKind::Blocked => "access blocked".to_string(),
            FetchErrorKind::RateLimited => "too many requests".to_string(),
            _ => "unexpected status".to_string(),
        };
        Self {
            endpoint,
            kind,
            status: Some(status),
            message,
        }
    }

    /// Create an error for a transport failure (connection refused, reset, timeout)
    pub fn transport(endpoint: Endpoint, err: &reqwest::Error) -> Self {
        Self {
            endpoint,
            kind: FetchErrorKind::HttpError,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    /// Create an error for a payload that did not parse
    pub fn parse(endpoint: Endpoint, status: u16, err: ParseError) -> Self {
        Self {
            endpoint,
            kind: FetchErrorKind::ParseError,
            status: Some(status),
            message: err.to_string(),
        }
    }

    /// Whether this error asks the poller to slow down
    pub fn is_backoff_signal(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Blocked | FetchErrorKind::RateLimited
        )
    }
}

/// Both endpoints failed within the same poll cycle
#[derive(Error, Debug)]
#[error("All endpoints failed: primary: {primary}; secondary: {secondary}")]
pub struct AggregateFetchFailure {
    /// Failure from the primary endpoint
    pub primary: FetchError,

    /// Failure from the secondary endpoint
    pub secondary: FetchError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_status() {
        assert_eq!(FetchErrorKind::from_status(403), FetchErrorKind::Blocked);
        assert_eq!(FetchErrorKind::from_status(429), FetchErrorKind::RateLimited);
        assert_eq!(FetchErrorKind::from_status(500), FetchErrorKind::HttpError);
        assert_eq!(FetchErrorKind::from_status(404), FetchErrorKind::HttpError);
    }

    #[test]
    fn test_display_includes_status() {
        let err = FetchError::from_status(Endpoint::Primary, 403);
        let text = err.to_string();
        assert!(text.contains("blocked"));
        assert!(text.contains("HTTP 403"));
        assert!(text.contains("primary"));
    }

    #[test]
    fn test_backoff_signal() {
        assert!(FetchError::from_status(Endpoint::Primary, 403).is_backoff_signal());
        assert!(FetchError::from_status(Endpoint::Primary, 429).is_backoff_signal());
        assert!(!FetchError::from_status(Endpoint::Primary, 502).is_backoff_signal());
    }

    #[test]
    fn test_aggregate_display() {
        let err = AggregateFetchFailure {
            primary: FetchError::from_status(Endpoint::Primary, 500),
            secondary: FetchError::parse(
                Endpoint::Secondary,
                200,
                ParseError::EmbeddedDataNotFound,
            ),
        };
        let text = err.to_string();
        assert!(text.contains("primary"));
        assert!(text.contains("parse_error"));
    }
}
