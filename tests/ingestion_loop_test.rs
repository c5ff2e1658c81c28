//! End-to-end tests for IngestionLoop
//!
//! Upstreams are wiremock servers; the loop runs on the test runtime and is
//! stopped through its shutdown channel.

mod common;

use std::time::Duration;

use common::{batch_json, event, RecordingSink};
use flashfeed::models::Endpoint;
use flashfeed::pipeline::{IngestionLoop, LastPoll, LoopSettings, ALL_FAILED_MESSAGE, FALLBACK_MESSAGE};
use flashfeed::scheduler::ManualClock;
use flashfeed::source::{EndpointTarget, FailoverFetcher, FailoverPolicy, SourceClient};
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(primary: String, secondary: String, base: Duration) -> FailoverFetcher {
    FailoverFetcher::new(
        SourceClient::new().unwrap(),
        EndpointTarget::new(Endpoint::Primary, primary),
        EndpointTarget::new(Endpoint::Secondary, secondary),
        FailoverPolicy {
            base_interval: base,
            blocked_factor: 5,
            rate_limited_factor: 2,
        },
    )
}

fn fast_settings() -> LoopSettings {
    LoopSettings {
        tick_period: Duration::from_millis(20),
        lead_time: Duration::from_millis(50),
        poll_jitter: Duration::ZERO,
        max_render_events: 50,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// First batch renders immediately; a later new event is replayed
#[tokio::test]
async fn test_initial_load_then_replay() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(batch_json("1 234", "56", &[event("a", 100), event("b", 105)])),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(200).set_body_string(batch_json(
            "1 235",
            "56",
            &[event("a", 100), event("b", 105), event("c", 130)],
        )))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(
        format!("{}/primary", mock_server.uri()),
        format!("{}/secondary", mock_server.uri()),
        Duration::from_millis(200),
    );
    let sink = RecordingSink::new();
    let ingestion = IngestionLoop::new(fetcher, sink.clone(), fast_settings());
    let status = ingestion.status();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(ingestion.run(shutdown_rx));

    wait_until(|| !sink.snapshot().delivered.is_empty()).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let recorded = sink.snapshot();
    assert_eq!(recorded.initial.len(), 1);
    let initial_ids: Vec<_> = recorded.initial[0].iter().map(|e| e.id.as_str()).collect();
    assert_eq!(initial_ids, vec!["b", "a"]);
    assert_eq!(recorded.stats[0], (1234, 56));
    assert_eq!(recorded.delivered_ids(), vec!["c".to_string()]);
    assert!(recorded.endpoints.is_empty());

    let status = status.borrow().clone();
    assert_eq!(status.active_endpoint, Endpoint::Primary);
    assert_eq!(status.seen, 3);
    assert_eq!(status.delivered, 1);
    assert_eq!(status.status_line(), "API: Primary");
}

/// Blocked primary: fallback batch is used and the switch is reported
#[tokio::test]
async fn test_blocked_primary_reports_switch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secondary"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(batch_json("5", "2", &[event("x", 10), event("y", 11)])),
        )
        .mount(&mock_server)
        .await;

    let base = Duration::from_secs(60);
    let fetcher = fetcher(
        format!("{}/primary", mock_server.uri()),
        format!("{}/secondary", mock_server.uri()),
        base,
    );
    let sink = RecordingSink::new();
    let ingestion = IngestionLoop::new(fetcher, sink.clone(), fast_settings());
    let mut status = ingestion.status();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(ingestion.run(shutdown_rx));

    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| matches!(s.last_poll, LastPoll::Succeeded { .. })),
    )
    .await
    .expect("poll should complete")
    .unwrap()
    .clone();

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(snapshot.active_endpoint, Endpoint::Secondary);
    assert_eq!(snapshot.poll_interval_ms, 300_000);
    assert_eq!(snapshot.status_line(), "API: Secondary");

    let recorded = sink.snapshot();
    assert_eq!(recorded.endpoints, vec!["Secondary".to_string()]);
    assert!(recorded.messages.contains(&FALLBACK_MESSAGE.to_string()));
    assert_eq!(recorded.initial[0].len(), 2);
}

/// A slow poll is not overlapped by the next one
#[tokio::test]
async fn test_poll_skipped_while_in_flight() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(batch_json("0", "0", &[]))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(
        format!("{}/primary", mock_server.uri()),
        format!("{}/secondary", mock_server.uri()),
        Duration::from_millis(300),
    );
    let ingestion = IngestionLoop::new(fetcher, RecordingSink::new(), fast_settings());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(ingestion.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    // Shutdown aborts the in-flight fetch instead of waiting for it
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_millis(200), handle)
        .await
        .expect("loop should stop promptly")
        .unwrap()
        .unwrap();
}

/// Aggregate failures are shown in the status and never stop the loop
#[tokio::test(start_paused = true)]
async fn test_all_endpoints_failing_keeps_running() {
    let fetcher = fetcher(
        "http://127.0.0.1:1/primary".to_string(),
        "http://127.0.0.1:1/secondary".to_string(),
        Duration::from_secs(60),
    );
    let sink = RecordingSink::new();
    let ingestion = IngestionLoop::new(fetcher, sink.clone(), fast_settings());
    let mut status = ingestion.status();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(ingestion.run(shutdown_rx));

    let snapshot = status
        .wait_for(|s| matches!(s.last_poll, LastPoll::Failed { .. }))
        .await
        .unwrap()
        .clone();
    assert_eq!(snapshot.status_line(), ALL_FAILED_MESSAGE);
    assert_eq!(snapshot.active_endpoint, Endpoint::Primary);
    assert_eq!(snapshot.seen, 0);

    // Let several more poll periods pass
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert!(!handle.is_finished());

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let recorded = sink.snapshot();
    assert!(recorded.initial.is_empty());
    assert!(recorded.messages.iter().all(|m| m == ALL_FAILED_MESSAGE));
}

/// A loop told to stop before starting returns without polling
#[tokio::test(start_paused = true)]
async fn test_shutdown_before_start() {
    let fetcher = fetcher(
        "http://127.0.0.1:1/primary".to_string(),
        "http://127.0.0.1:1/secondary".to_string(),
        Duration::from_secs(60),
    );
    let sink = RecordingSink::new();
    let ingestion = IngestionLoop::new(fetcher, sink.clone(), LoopSettings::default());

    let (_shutdown_tx, shutdown_rx) = watch::channel(true);
    ingestion.run(shutdown_rx).await.unwrap();

    let recorded = sink.snapshot();
    assert!(recorded.messages.is_empty());
    assert!(recorded.stats.is_empty());
}

/// Deliveries follow the injected clock, not the timers
#[tokio::test]
async fn test_delivery_uses_injected_clock() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(200).set_body_string(batch_json("1", "1", &[event("a", 1)])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(batch_json("2", "1", &[event("a", 1), event("b", 2)])),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(
        format!("{}/primary", mock_server.uri()),
        format!("{}/secondary", mock_server.uri()),
        Duration::from_millis(100),
    );
    let clock = ManualClock::new();
    let sink = RecordingSink::new();
    let ingestion =
        IngestionLoop::new(fetcher, sink.clone(), fast_settings()).with_clock(clock.clone());
    let mut status = ingestion.status();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(ingestion.run(shutdown_rx));

    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.pending == 1))
        .await
        .expect("new event should be queued")
        .unwrap();

    // Frozen clock: the timers keep ticking but nothing is due
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sink.snapshot().delivered.is_empty());

    clock.advance(Duration::from_millis(50));
    wait_until(|| !sink.snapshot().delivered.is_empty()).await;

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(sink.snapshot().delivered_ids(), vec!["b".to_string()]);
}
