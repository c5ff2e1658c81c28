//! Read-only status endpoint for a running ingestion loop
//!
//! Served by `flashfeed watch --status-addr`:
//!
//! - `GET /status` - latest [`FeedStatus`] as JSON, plus the status line
//! - `GET /metrics` - Prometheus text exposition

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::metrics;
use crate::pipeline::FeedStatus;

/// `/status` body
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status_line: String,

    #[serde(flatten)]
    pub status: FeedStatus,
}

/// Build the status router over a status subscription
pub fn create_router(status: watch::Receiver<FeedStatus>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/metrics", get(get_metrics))
        .with_state(status)
        .layer(TraceLayer::new_for_http())
}

async fn get_status(State(status): State<watch::Receiver<FeedStatus>>) -> impl IntoResponse {
    let status = status.borrow().clone();
    Json(StatusResponse {
        status_line: status.status_line(),
        status,
    })
}

async fn get_metrics() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve the status routes until `shutdown_signal` resolves
pub async fn serve(
    addr: SocketAddr,
    status: watch::Receiver<FeedStatus>,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Status endpoint listening");

    axum::serve(listener, create_router(status))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
