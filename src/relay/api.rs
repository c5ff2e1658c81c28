//! Relay route handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;

use crate::metrics;

use super::{RelayError, RelayState};

// ============================================================================
// API Response Types
// ============================================================================

/// Error body returned on upstream failure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Throttled => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the relay router
pub fn create_router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/primary", get(relay_primary))
        .route("/api/fallback", get(relay_fallback))
        .with_state(state)
}

async fn health_check(State(state): State<RelayState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn relay_primary(State(state): State<RelayState>) -> Response {
    respond("primary", state.relay_primary().await)
}

async fn relay_fallback(State(state): State<RelayState>) -> Response {
    respond("fallback", state.relay_fallback().await)
}

fn respond(route: &str, result: Result<Value, RelayError>) -> Response {
    let response = match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            tracing::error!(route, error = %e, "Relay request failed");
            e.into_response()
        }
    };

    metrics::record_relay_request(route, response.status().as_u16());
    response
}
