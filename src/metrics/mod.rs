//! Prometheus metrics for the ingestion pipeline and the relay
//!
//! This module provides metrics tracking for:
//! - Polling: poll outcomes, fetch errors per endpoint and kind, current interval
//! - Replay: events discovered, events delivered, pending depth
//! - Relay: upstream requests per route and status
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, or it is never called, metric operations are no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

use crate::models::Endpoint;
use crate::utils::error::FetchError;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all ingestion metrics
struct FeedMetrics {
    polls: CounterVec,
    polls_skipped: Counter,
    fetch_errors: CounterVec,
    events_discovered: Counter,
    events_delivered: Counter,
    pending_deliveries: Gauge,
    poll_interval_seconds: Gauge,
    active_endpoint: Gauge,
    relay_requests: CounterVec,
}

/// `None` inside the lock records a failed registration
static FEED_METRICS: OnceLock<Option<FeedMetrics>> = OnceLock::new();

fn metrics() -> Option<&'static FeedMetrics> {
    FEED_METRICS.get().and_then(Option::as_ref)
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once, including concurrently; only the first call
/// registers anything.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let registered = FEED_METRICS.get_or_init(|| match register_all() {
        Ok(metrics) => {
            tracing::info!("Prometheus metrics initialized successfully");
            Some(metrics)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Metrics registration failed, metrics disabled");
            None
        }
    });

    if registered.is_some() {
        Ok(())
    } else {
        Err("Metrics registration failed".into())
    }
}

fn register_all() -> Result<FeedMetrics, prometheus::Error> {
    Ok(FeedMetrics {
        polls: register_counter_vec!(
            "flashfeed_polls_total",
            "Poll cycles by outcome",
            &["outcome"]
        )?,
        polls_skipped: register_counter!(
            "flashfeed_polls_skipped_total",
            "Polls skipped because the previous one was still in flight"
        )?,
        fetch_errors: register_counter_vec!(
            "flashfeed_fetch_errors_total",
            "Failed fetch attempts by endpoint and kind",
            &["endpoint", "kind"]
        )?,
        events_discovered: register_counter!(
            "flashfeed_events_discovered_total",
            "Events classified as new by deduplication"
        )?,
        events_delivered: register_counter!(
            "flashfeed_events_delivered_total",
            "Events delivered by the replay scheduler"
        )?,
        pending_deliveries: register_gauge!(
            "flashfeed_pending_deliveries",
            "Events waiting in the replay buffer"
        )?,
        poll_interval_seconds: register_gauge!(
            "flashfeed_poll_interval_seconds",
            "Current polling interval including backoff"
        )?,
        active_endpoint: register_gauge!(
            "flashfeed_active_endpoint",
            "Active upstream endpoint (0 = primary, 1 = secondary)"
        )?,
        relay_requests: register_counter_vec!(
            "flashfeed_relay_requests_total",
            "Relay requests by route and response status",
            &["route", "status"]
        )?,
    })
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    metrics().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a completed poll cycle ("primary", "secondary" or "failed")
pub fn record_poll(outcome: &str) {
    if let Some(m) = metrics() {
        m.polls.with_label_values(&[outcome]).inc();
    }
}

/// Record a poll skipped because one was already in flight
pub fn record_poll_skipped() {
    if let Some(m) = metrics() {
        m.polls_skipped.inc();
    }
}

/// Record a failed fetch attempt
pub fn record_fetch_error(err: &FetchError) {
    if let Some(m) = metrics() {
        m.fetch_errors
            .with_label_values(&[err.endpoint.as_str(), err.kind.as_str()])
            .inc();
    }
}

/// Record newly discovered events
pub fn record_discovered(count: usize) {
    if count == 0 {
        return;
    }
    if let Some(m) = metrics() {
        m.events_discovered.inc_by(count as f64);
    }
}

/// Record delivered events
pub fn record_delivered(count: usize) {
    if count == 0 {
        return;
    }
    if let Some(m) = metrics() {
        m.events_delivered.inc_by(count as f64);
    }
}

/// Update the replay buffer depth
pub fn set_pending(count: usize) {
    if let Some(m) = metrics() {
        m.pending_deliveries.set(count as f64);
    }
}

/// Update the current polling interval
pub fn set_poll_interval(interval: Duration) {
    if let Some(m) = metrics() {
        m.poll_interval_seconds.set(interval.as_secs_f64());
    }
}

/// Update the active endpoint
pub fn set_active_endpoint(endpoint: Endpoint) {
    if let Some(m) = metrics() {
        m.active_endpoint.set(endpoint.as_metric());
    }
}

/// Record a relay request
pub fn record_relay_request(route: &str, status: u16) {
    if let Some(m) = metrics() {
        let status_str = status.to_string();
        m.relay_requests
            .with_label_values(&[route, &status_str])
            .inc();
    }
}
