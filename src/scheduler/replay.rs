//! Replay of newly discovered events at their original spacing
//!
//! A batch of new events is anchored a short lead time into the future and
//! each event keeps its real offset from the earliest one, so three events
//! that happened 0 s, 5 s and 30 s apart are delivered 0 s, 5 s and 30 s apart.
//! Batches that overlap in time share one ordered buffer.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::{Event, ScheduledDelivery};

/// Pending deliveries ordered by `(deliver_at, enqueue sequence)`
#[derive(Debug)]
pub struct ReplayScheduler {
    lead_time: Duration,
    pending: BTreeMap<(Instant, u64), ScheduledDelivery>,
    next_seq: u64,
}

impl ReplayScheduler {
    pub fn new(lead_time: Duration) -> Self {
        Self {
            lead_time,
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn lead_time(&self) -> Duration {
        self.lead_time
    }

    /// Schedule `events` relative to `now`
    ///
    /// Events are stably sorted by `occurred_at`; the earliest is due at
    /// `now + lead_time` and every other one `occurred_at - earliest` seconds
    /// after it. Returns the number of entries added.
    pub fn enqueue(&mut self, mut events: Vec<Event>, now: Instant) -> usize {
        if events.is_empty() {
            return 0;
        }

        events.sort_by_key(|event| event.occurred_at);

        let anchor = now + self.lead_time;
        let first = events[0].occurred_at;
        let count = events.len();

        for event in events {
            let offset = Duration::from_secs(event.occurred_at.saturating_sub(first).max(0) as u64);
            // Offsets beyond the clock's range collapse onto the anchor
            let deliver_at = anchor.checked_add(offset).unwrap_or(anchor);

            let seq = self.next_seq;
            self.next_seq += 1;

            self.pending.insert(
                (deliver_at, seq),
                ScheduledDelivery {
                    occurred_at: event.occurred_at,
                    event,
                    deliver_at,
                },
            );
        }

        tracing::debug!(
            count,
            pending = self.pending.len(),
            span_secs = self
                .pending
                .values()
                .last()
                .map(|d| d.deliver_at.saturating_duration_since(anchor).as_secs())
                .unwrap_or(0),
            "Events scheduled for replay"
        );

        count
    }

    /// Remove and return every delivery due at or before `now`
    ///
    /// Results are ascending by `deliver_at`; ties keep enqueue order.
    pub fn tick(&mut self, now: Instant) -> Vec<ScheduledDelivery> {
        let mut due = Vec::new();

        while let Some(entry) = self.pending.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }

        due
    }

    /// Number of pending deliveries
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest pending delivery instant
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.keys().next().map(|(at, _)| *at)
    }

    /// Iterate over pending deliveries in delivery order
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledDelivery> {
        self.pending.values()
    }
}
