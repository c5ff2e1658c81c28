//! Presentation collaborators
//!
//! The ingestion loop knows nothing about rendering. It reports what happened
//! through [`PresentationSink`]; a terminal logger, a test recorder or a
//! broadcast channel feeding some UI can sit on the other side.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::Event;

// ============================================================================
// Sink Trait
// ============================================================================

/// Receiver of everything the presentation layer needs to render
pub trait PresentationSink: Send {
    /// First batch ever received, newest first, already truncated
    fn on_initial_batch(&mut self, events: &[Event]);

    /// One replayed event whose delivery instant has arrived
    fn on_new_event_delivered(&mut self, event: &Event);

    /// Parsed summary counters from the latest batch
    fn on_stats_updated(&mut self, total_events: u64, total_actors: u64);

    /// Active endpoint changed; `name` is the display label
    fn on_endpoint_changed(&mut self, name: &str);

    /// Replay buffer depth after an enqueue or a tick
    fn on_buffer_depth_changed(&mut self, count: usize);

    /// Human-readable status indicator
    fn on_status_message(&mut self, message: &str) {
        let _ = message;
    }
}

impl<S: PresentationSink + ?Sized> PresentationSink for Box<S> {
    fn on_initial_batch(&mut self, events: &[Event]) {
        (**self).on_initial_batch(events)
    }

    fn on_new_event_delivered(&mut self, event: &Event) {
        (**self).on_new_event_delivered(event)
    }

    fn on_stats_updated(&mut self, total_events: u64, total_actors: u64) {
        (**self).on_stats_updated(total_events, total_actors)
    }

    fn on_endpoint_changed(&mut self, name: &str) {
        (**self).on_endpoint_changed(name)
    }

    fn on_buffer_depth_changed(&mut self, count: usize) {
        (**self).on_buffer_depth_changed(count)
    }

    fn on_status_message(&mut self, message: &str) {
        (**self).on_status_message(message)
    }
}

// ============================================================================
// Log Sink
// ============================================================================

/// Writes presentation updates as `tracing` events
#[derive(Debug, Default)]
pub struct LogSink {
    last_depth: Option<usize>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresentationSink for LogSink {
    fn on_initial_batch(&mut self, events: &[Event]) {
        tracing::info!(count = events.len(), "Initial batch loaded");
        for event in events {
            tracing::info!(
                id = %event.id,
                actor = %event.actor,
                location = %event.location,
                occurred_at = event.occurred_at,
                "{}",
                event.caption
            );
        }
    }

    fn on_new_event_delivered(&mut self, event: &Event) {
        let occurred = chrono::DateTime::from_timestamp(event.occurred_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| event.occurred_at.to_string());

        tracing::info!(
            id = %event.id,
            actor = %event.actor,
            location = %event.location,
            image = %event.payload_ref,
            occurred = %occurred,
            "New flash: {}",
            event.caption
        );
    }

    fn on_stats_updated(&mut self, total_events: u64, total_actors: u64) {
        tracing::info!(total_events, total_actors, "Stats updated");
    }

    fn on_endpoint_changed(&mut self, name: &str) {
        tracing::info!(endpoint = name, "Active endpoint changed");
    }

    fn on_buffer_depth_changed(&mut self, count: usize) {
        // Only log changes; ticks report the depth every period
        if self.last_depth != Some(count) {
            tracing::debug!(pending = count, "Replay buffer depth");
            self.last_depth = Some(count);
        }
    }

    fn on_status_message(&mut self, message: &str) {
        tracing::info!("{message}");
    }
}

// ============================================================================
// Broadcast Sink
// ============================================================================

/// Presentation update as a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    InitialBatch { events: Vec<Event> },
    Delivered { event: Event },
    Stats { total_events: u64, total_actors: u64 },
    EndpointChanged { name: String },
    BufferDepth { count: usize },
    Status { message: String },
}

/// Forwards every update to a `broadcast` channel
///
/// Updates are dropped when nobody is subscribed.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<SinkEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to future updates
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.sender.subscribe()
    }

    fn send(&self, event: SinkEvent) {
        let _ = self.sender.send(event);
    }
}

impl PresentationSink for BroadcastSink {
    fn on_initial_batch(&mut self, events: &[Event]) {
        self.send(SinkEvent::InitialBatch {
            events: events.to_vec(),
        });
    }

    fn on_new_event_delivered(&mut self, event: &Event) {
        self.send(SinkEvent::Delivered {
            event: event.clone(),
        });
    }

    fn on_stats_updated(&mut self, total_events: u64, total_actors: u64) {
        self.send(SinkEvent::Stats {
            total_events,
            total_actors,
        });
    }

    fn on_endpoint_changed(&mut self, name: &str) {
        self.send(SinkEvent::EndpointChanged {
            name: name.to_string(),
        });
    }

    fn on_buffer_depth_changed(&mut self, count: usize) {
        self.send(SinkEvent::BufferDepth { count });
    }

    fn on_status_message(&mut self, message: &str) {
        self.send(SinkEvent::Status {
            message: message.to_string(),
        });
    }
}
