//! In-memory event deduplication
//!
//! [`DedupeStore`] owns the set of every event id it has classified. The set
//! only grows: upstream batches are bounded in size and nothing is persisted
//! across restarts, so there is no eviction.

use std::collections::HashSet;

use crate::models::{Batch, Event};

// ============================================================================
// Partition Result
// ============================================================================

/// Result of classifying one batch
#[derive(Debug, Clone)]
pub struct Partition {
    /// Events not seen before, in batch order
    pub new_events: Vec<Event>,

    /// The full batch as received
    pub batch: Batch,

    /// True only for the first batch this store ever processed
    pub initial_load: bool,
}

impl Partition {
    /// Get count of new events
    pub fn new_count(&self) -> usize {
        self.new_events.len()
    }

    /// Get count of already-seen events
    pub fn existing_count(&self) -> usize {
        self.batch.len().saturating_sub(self.new_events.len())
    }

    /// Get deduplication ratio (0.0 = all new, 1.0 = all existing)
    pub fn dedup_ratio(&self) -> f64 {
        if self.batch.is_empty() {
            return 0.0;
        }
        self.existing_count() as f64 / self.batch.len() as f64
    }
}

// ============================================================================
// Dedupe Store
// ============================================================================

/// Set of event ids already handed to the presentation layer
#[derive(Debug, Default)]
pub struct DedupeStore {
    seen: HashSet<String>,
    batches_processed: u64,
}

impl DedupeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify every event in `batch` as new or already seen
    ///
    /// All ids are recorded as a side effect. A repeated id inside the same
    /// batch counts as new only once.
    pub fn partition(&mut self, batch: Batch) -> Partition {
        let initial_load = self.batches_processed == 0;
        self.batches_processed += 1;

        let new_events: Vec<Event> = batch
            .events
            .iter()
            .filter(|event| self.seen.insert(event.id.clone()))
            .cloned()
            .collect();

        tracing::debug!(
            total = batch.len(),
            new = new_events.len(),
            initial_load,
            seen = self.seen.len(),
            "Batch partitioned"
        );

        Partition {
            new_events,
            batch,
            initial_load,
        }
    }

    /// Whether `id` has been classified before
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Number of distinct ids seen
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Number of batches partitioned so far
    pub fn batches_processed(&self) -> u64 {
        self.batches_processed
    }
}
