//! Property tests for replay scheduling and deduplication

mod common;

use std::time::Duration;

use common::event;
use flashfeed::models::{Batch, Event};
use flashfeed::scheduler::ReplayScheduler;
use flashfeed::storage::DedupeStore;
use proptest::prelude::*;
use tokio::time::Instant;

fn events_strategy() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec((0u16..500, 0i64..3_600), 0..40).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(id, ts)| event(&format!("e{id}"), 1_700_000_000 + ts))
            .collect()
    })
}

fn batch(events: Vec<Event>) -> Batch {
    Batch {
        total_event_count: "0".to_string(),
        total_actor_count: "0".to_string(),
        events,
    }
}

proptest! {
    #[test]
    fn enqueue_keeps_original_spacing(events in events_strategy(), lead_ms in 0u64..5_000) {
        let lead = Duration::from_millis(lead_ms);
        let now = Instant::now();
        let mut scheduler = ReplayScheduler::new(lead);

        let expected = events.len();
        prop_assert_eq!(scheduler.enqueue(events, now), expected);
        prop_assert_eq!(scheduler.len(), expected);

        let pending: Vec<_> = scheduler.iter().cloned().collect();
        if let Some(first) = pending.first() {
            let anchor = now + lead;
            prop_assert_eq!(first.deliver_at, anchor);
            for delivery in &pending {
                let offset = (delivery.occurred_at - first.occurred_at) as u64;
                prop_assert_eq!(delivery.deliver_at, anchor + Duration::from_secs(offset));
            }
            for pair in pending.windows(2) {
                prop_assert!(pair[0].deliver_at <= pair[1].deliver_at);
            }
        }
    }

    #[test]
    fn tick_never_returns_future_entries(
        events in events_strategy(),
        probes in prop::collection::vec(0u64..4_000_000, 1..10),
    ) {
        let start = Instant::now();
        let mut scheduler = ReplayScheduler::new(Duration::from_secs(1));
        let total = scheduler.enqueue(events, start);

        let mut probes = probes;
        probes.sort_unstable();

        let mut delivered = 0;
        let mut last = None;
        for probe_ms in probes {
            let now = start + Duration::from_millis(probe_ms);
            for delivery in scheduler.tick(now) {
                prop_assert!(delivery.deliver_at <= now);
                if let Some(previous) = last {
                    prop_assert!(previous <= delivery.deliver_at);
                }
                last = Some(delivery.deliver_at);
                delivered += 1;
            }
            // Everything still pending is in the future
            if let Some(next) = scheduler.next_due() {
                prop_assert!(next > now);
            }
        }

        let rest = scheduler.tick(start + Duration::from_secs(10_000));
        prop_assert_eq!(delivered + rest.len(), total);
        prop_assert!(scheduler.is_empty());
    }

    #[test]
    fn dedup_is_idempotent(events in events_strategy()) {
        let mut store = DedupeStore::new();
        let first = store.partition(batch(events.clone()));
        let second = store.partition(batch(events));

        prop_assert!(second.new_events.is_empty());
        prop_assert_eq!(first.new_events.len(), store.len());
    }

    #[test]
    fn dedup_reports_each_id_once(a in events_strategy(), b in events_strategy()) {
        let mut store = DedupeStore::new();
        let first = store.partition(batch(a));
        let second = store.partition(batch(b));

        let mut ids: Vec<_> = first
            .new_events
            .iter()
            .chain(second.new_events.iter())
            .map(|e| e.id.clone())
            .collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), total);
        prop_assert_eq!(total, store.len());
    }
}

/// Two batches enqueued five seconds apart drain in global order
#[test]
fn test_overlapping_batches_scenario() {
    let start = Instant::now();
    let mut scheduler = ReplayScheduler::new(Duration::from_secs(1));

    scheduler.enqueue(vec![event("a1", 100), event("a2", 120)], start);
    scheduler.enqueue(
        vec![event("b2", 210), event("b1", 200)],
        start + Duration::from_secs(5),
    );

    let order: Vec<_> = scheduler
        .tick(start + Duration::from_secs(60))
        .into_iter()
        .map(|d| d.event.id)
        .collect();

    // a1 @ +1s, b1 @ +6s, b2 @ +16s, a2 @ +21s
    assert_eq!(order, vec!["a1", "b1", "b2", "a2"]);
}
