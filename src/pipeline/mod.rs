//! Batch handling between the fetcher and the presentation layer
//!
//! [`Pipeline`] owns the deduplication set, the replay buffer and the sink.
//! It is synchronous and takes `now` as an argument; [`runner::IngestionLoop`]
//! drives it from the poll and tick timers.
//!
//! ```text
//!   FetchedBatch ──► stats ──► DedupeStore::partition
//!                                   │
//!                 initial_load ─────┴───── otherwise
//!                      │                      │
//!          on_initial_batch (newest 50)   ReplayScheduler::enqueue
//! ```

pub mod runner;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::metrics;
use crate::models::{Endpoint, Event};
use crate::scheduler::ReplayScheduler;
use crate::sink::PresentationSink;
use crate::source::{EndpointState, FetchedBatch};
use crate::storage::DedupeStore;
use crate::utils::error::AggregateFetchFailure;

pub use runner::{IngestionLoop, LoopSettings};

/// Shown after an aggregate failure until the next successful poll
pub const ALL_FAILED_MESSAGE: &str = "All endpoints failed - retrying...";

/// Emitted when polling moves back to the primary endpoint
pub const PRIMARY_RESTORED_MESSAGE: &str = "Primary API restored";

/// Emitted when polling moves to the secondary endpoint
pub const FALLBACK_MESSAGE: &str = "Using fallback endpoint";

// ============================================================================
// Feed Status
// ============================================================================

/// Result of the most recent poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LastPoll {
    /// No poll has completed yet
    Pending,
    Succeeded { endpoint: Endpoint, events: usize },
    Failed { error: String },
}

/// Snapshot of the ingestion loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStatus {
    pub total_events: u64,
    pub total_actors: u64,
    pub active_endpoint: Endpoint,
    pub poll_interval_ms: u64,

    /// Deliveries waiting in the replay buffer
    pub pending: usize,

    /// Distinct event ids seen so far
    pub seen: usize,

    /// Events handed to the sink by the replay scheduler
    pub delivered: u64,

    pub last_poll: LastPoll,
    pub last_poll_at: Option<DateTime<Utc>>,
}

impl FeedStatus {
    pub fn new(state: EndpointState) -> Self {
        Self {
            total_events: 0,
            total_actors: 0,
            active_endpoint: state.active,
            poll_interval_ms: state.poll_interval.as_millis() as u64,
            pending: 0,
            seen: 0,
            delivered: 0,
            last_poll: LastPoll::Pending,
            last_poll_at: None,
        }
    }

    /// One-line human status indicator
    pub fn status_line(&self) -> String {
        match self.last_poll {
            LastPoll::Failed { .. } => ALL_FAILED_MESSAGE.to_string(),
            _ => format!("API: {}", self.active_endpoint.label()),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Dedup, replay and presentation state for one feed
pub struct Pipeline<S> {
    dedup: DedupeStore,
    scheduler: ReplayScheduler,
    sink: S,
    max_render_events: usize,
    status: FeedStatus,
}

impl<S: PresentationSink> Pipeline<S> {
    pub fn new(
        sink: S,
        scheduler: ReplayScheduler,
        max_render_events: usize,
        initial_state: EndpointState,
    ) -> Self {
        Self {
            dedup: DedupeStore::new(),
            scheduler,
            sink,
            max_render_events,
            status: FeedStatus::new(initial_state),
        }
    }

    /// Handle a successful poll
    pub fn on_batch(&mut self, fetched: FetchedBatch, state: EndpointState, now: Instant) {
        let FetchedBatch {
            batch,
            endpoint,
            transition,
        } = fetched;

        metrics::record_poll(endpoint.as_str());
        let was_failing = matches!(self.status.last_poll, LastPoll::Failed { .. });

        self.apply_state(state);
        self.status.last_poll = LastPoll::Succeeded {
            endpoint,
            events: batch.len(),
        };
        self.status.last_poll_at = Some(Utc::now());

        if let Some(transition) = transition {
            self.sink.on_endpoint_changed(transition.to.label());
            let message = match transition.to {
                Endpoint::Primary => PRIMARY_RESTORED_MESSAGE,
                Endpoint::Secondary => FALLBACK_MESSAGE,
            };
            self.sink.on_status_message(message);
        } else if was_failing {
            let line = self.status.status_line();
            self.sink.on_status_message(&line);
        }

        match batch.stats() {
            Ok(stats) => {
                self.status.total_events = stats.total_events;
                self.status.total_actors = stats.total_actors;
                self.sink
                    .on_stats_updated(stats.total_events, stats.total_actors);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable batch counters, keeping previous stats");
            }
        }

        let partition = self.dedup.partition(batch);
        self.status.seen = self.dedup.len();
        metrics::record_discovered(partition.new_count());

        if partition.initial_load {
            let events = newest_first(partition.batch.events, self.max_render_events);
            tracing::info!(
                endpoint = %endpoint,
                rendered = events.len(),
                "Initial batch received"
            );
            self.sink.on_initial_batch(&events);
        } else if !partition.new_events.is_empty() {
            let count = self.scheduler.enqueue(partition.new_events, now);
            tracing::info!(endpoint = %endpoint, new = count, "New events queued for replay");
            self.buffer_changed();
        } else {
            tracing::debug!(endpoint = %endpoint, "No new events");
        }
    }

    /// Handle a poll where both endpoints failed
    ///
    /// Seen ids and pending deliveries are untouched.
    pub fn on_failure(&mut self, failure: &AggregateFetchFailure, state: EndpointState) {
        metrics::record_poll("failed");

        self.apply_state(state);
        self.status.last_poll = LastPoll::Failed {
            error: failure.to_string(),
        };
        self.status.last_poll_at = Some(Utc::now());
        self.sink.on_status_message(ALL_FAILED_MESSAGE);
    }

    /// Deliver everything due at `now`
    ///
    /// Returns the number of events delivered.
    pub fn on_tick(&mut self, now: Instant) -> usize {
        let due = self.scheduler.tick(now);
        if due.is_empty() {
            return 0;
        }

        for delivery in &due {
            self.sink.on_new_event_delivered(&delivery.event);
        }

        self.status.delivered += due.len() as u64;
        metrics::record_delivered(due.len());
        self.buffer_changed();

        due.len()
    }

    fn buffer_changed(&mut self) {
        let pending = self.scheduler.len();
        self.status.pending = pending;
        metrics::set_pending(pending);
        self.sink.on_buffer_depth_changed(pending);
    }

    fn apply_state(&mut self, state: EndpointState) {
        self.status.active_endpoint = state.active;
        self.status.poll_interval_ms = state.poll_interval.as_millis() as u64;
    }

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    pub fn scheduler(&self) -> &ReplayScheduler {
        &self.scheduler
    }

    pub fn dedup(&self) -> &DedupeStore {
        &self.dedup
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Sort newest first (stable) and keep at most `limit` events
fn newest_first(mut events: Vec<Event>, limit: usize) -> Vec<Event> {
    events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    events.truncate(limit);
    events
}
