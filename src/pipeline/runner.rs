//! The ingestion loop: poll timer, tick timer and shutdown
//!
//! Fetches run on a spawned task so that replay ticks keep firing while a slow
//! upstream is being polled. The outcome comes back over a channel and is
//! applied by the loop task, which is the only owner of the dedup set and the
//! replay buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Config;
use crate::error::Result;
use crate::metrics;
use crate::scheduler::{Clock, ReplayScheduler, TokioClock};
use crate::sink::PresentationSink;
use crate::source::{EndpointState, FailoverFetcher, FetchedBatch};
use crate::utils::error::AggregateFetchFailure;
use crate::utils::jittered;

use super::{FeedStatus, Pipeline};

// ============================================================================
// Settings
// ============================================================================

/// Timer and rendering settings for [`IngestionLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Replay tick period
    pub tick_period: Duration,

    /// Delay between enqueue and the first delivery of a batch
    pub lead_time: Duration,

    /// Upper bound of the random delay added to each poll interval
    pub poll_jitter: Duration,

    /// Events forwarded with the initial batch
    pub max_render_events: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(500),
            lead_time: Duration::from_millis(1000),
            poll_jitter: Duration::from_secs(5),
            max_render_events: 50,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_period: config.tick_period(),
            lead_time: config.lead_time(),
            poll_jitter: config.poll_jitter(),
            max_render_events: config.pacing.max_render_events,
        }
    }

    /// Builder method to set the poll jitter
    pub fn with_poll_jitter(mut self, jitter: Duration) -> Self {
        self.poll_jitter = jitter;
        self
    }
}

/// What a spawned poll sends back
struct PollReport {
    result: std::result::Result<FetchedBatch, AggregateFetchFailure>,
    state: EndpointState,
}

// ============================================================================
// Ingestion Loop
// ============================================================================

/// Drives polling and replay until shut down
pub struct IngestionLoop<S, C = TokioClock> {
    fetcher: Arc<Mutex<FailoverFetcher>>,
    pipeline: Pipeline<S>,
    clock: C,
    settings: LoopSettings,
    status_tx: watch::Sender<FeedStatus>,
}

impl<S: PresentationSink> IngestionLoop<S, TokioClock> {
    pub fn new(fetcher: FailoverFetcher, sink: S, settings: LoopSettings) -> Self {
        let state = fetcher.state();
        let pipeline = Pipeline::new(
            sink,
            ReplayScheduler::new(settings.lead_time),
            settings.max_render_events,
            state,
        );
        let (status_tx, _) = watch::channel(pipeline.status().clone());

        Self {
            fetcher: Arc::new(Mutex::new(fetcher)),
            pipeline,
            clock: TokioClock,
            settings,
            status_tx,
        }
    }

    /// Build the fetcher and settings from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the header profiles cannot be built
    pub fn from_config(config: &Config, sink: S) -> Result<Self> {
        let fetcher = FailoverFetcher::from_config(config)?;
        Ok(Self::new(fetcher, sink, LoopSettings::from_config(config)))
    }
}

impl<S: PresentationSink, C: Clock> IngestionLoop<S, C> {
    /// Replace the time source used for enqueue and delivery
    pub fn with_clock<C2: Clock>(self, clock: C2) -> IngestionLoop<S, C2> {
        IngestionLoop {
            fetcher: self.fetcher,
            pipeline: self.pipeline,
            clock,
            settings: self.settings,
            status_tx: self.status_tx,
        }
    }

    /// Subscribe to status snapshots, published after every poll and delivery
    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status_tx.subscribe()
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run until `shutdown` turns true or its sender is dropped
    ///
    /// The first poll starts immediately. Upstream failures never end the
    /// loop; they only show up in the status. Returns the sink.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<S> {
        let (report_tx, mut report_rx) = mpsc::channel::<PollReport>(1);
        let mut in_flight: Option<JoinHandle<()>> = None;

        let mut ticker = tokio::time::interval(self.settings.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let poll_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(poll_timer);

        tracing::info!(
            tick_ms = self.settings.tick_period.as_millis() as u64,
            lead_ms = self.settings.lead_time.as_millis() as u64,
            "Ingestion loop started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.pipeline.on_tick(self.clock.now()) > 0 {
                        self.publish();
                    }
                }
                () = &mut poll_timer => {
                    if in_flight.as_ref().is_some_and(|task| !task.is_finished()) {
                        tracing::debug!("Previous poll still in flight, skipping");
                        metrics::record_poll_skipped();
                    } else {
                        in_flight = Some(self.spawn_poll(report_tx.clone()));
                    }
                    // Rescheduled again once the report arrives
                    let interval = self.pipeline.status().poll_interval_ms;
                    poll_timer.as_mut().reset(self.next_poll_at(Duration::from_millis(interval)));
                }
                Some(report) = report_rx.recv() => {
                    let now = self.clock.now();
                    match report.result {
                        Ok(fetched) => self.pipeline.on_batch(fetched, report.state, now),
                        Err(failure) => self.pipeline.on_failure(&failure, report.state),
                    }
                    poll_timer.as_mut().reset(self.next_poll_at(report.state.poll_interval));
                    self.publish();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Ingestion loop shutting down");
                        break;
                    }
                }
            }
        }

        if let Some(task) = in_flight.take() {
            task.abort();
        }

        Ok(self.pipeline.into_sink())
    }

    fn spawn_poll(&self, report_tx: mpsc::Sender<PollReport>) -> JoinHandle<()> {
        let fetcher = Arc::clone(&self.fetcher);

        tokio::spawn(async move {
            let mut fetcher = fetcher.lock().await;
            let result = fetcher.fetch_once().await;
            let state = fetcher.state();
            drop(fetcher);

            if report_tx.send(PollReport { result, state }).await.is_err() {
                tracing::debug!("Ingestion loop gone, dropping poll result");
            }
        })
    }

    fn next_poll_at(&self, interval: Duration) -> Instant {
        let delay = jittered(interval, self.settings.poll_jitter);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Next poll scheduled");
        Instant::now() + delay
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.pipeline.status().clone());
    }
}
