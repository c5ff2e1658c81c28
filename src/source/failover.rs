//! Primary/secondary failover with rate-limit backoff
//!
//! Each poll tries the primary endpoint first and falls through to the
//! secondary on any failure. A `403` or `429` from the primary lengthens the
//! polling interval before falling through; the interval snaps back to its
//! base value on the next successful primary fetch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::metrics;
use crate::models::{Batch, Endpoint};
use crate::utils::error::{AggregateFetchFailure, FetchError, FetchErrorKind};

use super::{EndpointTarget, SourceClient};

// ============================================================================
// Endpoint State
// ============================================================================

/// Which endpoint is active and how often to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointState {
    /// Endpoint that served the last successful fetch
    pub active: Endpoint,

    /// Current polling interval, including any backoff
    pub poll_interval: Duration,
}

impl EndpointState {
    /// Initial state: primary endpoint at the base interval
    pub fn new(base_interval: Duration) -> Self {
        Self {
            active: Endpoint::Primary,
            poll_interval: base_interval,
        }
    }
}

// ============================================================================
// Backoff Policy
// ============================================================================

/// Polling interval policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Interval used while the primary endpoint is healthy
    pub base_interval: Duration,

    /// Multiplier applied on `Blocked`
    pub blocked_factor: u32,

    /// Multiplier applied on `RateLimited`
    pub rate_limited_factor: u32,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            blocked_factor: 5,
            rate_limited_factor: 2,
        }
    }
}

impl FailoverPolicy {
    /// Build the policy from the pacing configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_interval: config.base_poll_interval(),
            blocked_factor: config.pacing.blocked_backoff_factor,
            rate_limited_factor: config.pacing.rate_limited_backoff_factor,
        }
    }

    /// Interval after a `403` from the primary endpoint
    pub fn blocked_cooldown(&self) -> Duration {
        self.base_interval * self.blocked_factor
    }

    /// Interval after a `429` from the primary endpoint
    pub fn rate_limited_cooldown(&self) -> Duration {
        self.base_interval * self.rate_limited_factor
    }

    /// Cooldown requested by an error kind, if any
    pub fn cooldown_for(&self, kind: FetchErrorKind) -> Option<Duration> {
        match kind {
            FetchErrorKind::Blocked => Some(self.blocked_cooldown()),
            FetchErrorKind::RateLimited => Some(self.rate_limited_cooldown()),
            FetchErrorKind::HttpError | FetchErrorKind::ParseError => None,
        }
    }
}

// ============================================================================
// Fetch Results
// ============================================================================

/// Change of active endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// A successful poll: the batch plus any endpoint switch it caused
#[derive(Debug, Clone)]
pub struct FetchedBatch {
    pub batch: Batch,

    /// Endpoint that served the batch
    pub endpoint: Endpoint,

    /// Set when this fetch changed the active endpoint
    pub transition: Option<Transition>,
}

// ============================================================================
// Failover Fetcher
// ============================================================================

/// Orchestrates primary/secondary fetch attempts and owns [`EndpointState`]
#[derive(Debug)]
pub struct FailoverFetcher {
    client: SourceClient,
    primary: EndpointTarget,
    secondary: EndpointTarget,
    policy: FailoverPolicy,
    state: EndpointState,
}

impl FailoverFetcher {
    /// Create a fetcher over explicit targets
    pub fn new(
        client: SourceClient,
        primary: EndpointTarget,
        secondary: EndpointTarget,
        policy: FailoverPolicy,
    ) -> Self {
        Self {
            client,
            primary,
            secondary,
            state: EndpointState::new(policy.base_interval),
            policy,
        }
    }

    /// Create a fetcher from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or a configured
    /// header is invalid
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = SourceClient::with_timeout(config.request_timeout())?;
        let (primary, secondary) = EndpointTarget::from_config(&config.source)?;

        Ok(Self::new(
            client,
            primary,
            secondary,
            FailoverPolicy::from_config(config),
        ))
    }

    /// Current endpoint state
    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn policy(&self) -> &FailoverPolicy {
        &self.policy
    }

    /// Run one poll cycle
    ///
    /// On aggregate failure the active endpoint is left as it was; only the
    /// backoff escalation from a primary `403`/`429` is kept.
    pub async fn fetch_once(
        &mut self,
    ) -> std::result::Result<FetchedBatch, AggregateFetchFailure> {
        let primary_error = match self.client.fetch(&self.primary).await {
            Ok(batch) => return Ok(self.on_success(Endpoint::Primary, batch)),
            Err(err) => err,
        };

        self.on_primary_failure(&primary_error);

        match self.client.fetch(&self.secondary).await {
            Ok(batch) => Ok(self.on_success(Endpoint::Secondary, batch)),
            Err(secondary_error) => {
                metrics::record_fetch_error(&secondary_error);
                tracing::error!(
                    primary = %primary_error,
                    secondary = %secondary_error,
                    "Both endpoints failed"
                );
                Err(AggregateFetchFailure {
                    primary: primary_error,
                    secondary: secondary_error,
                })
            }
        }
    }

    fn on_success(&mut self, endpoint: Endpoint, batch: Batch) -> FetchedBatch {
        let previous = self.state.active;

        if endpoint == Endpoint::Primary && self.state.poll_interval != self.policy.base_interval
        {
            tracing::info!(
                interval_ms = self.policy.base_interval.as_millis() as u64,
                "Primary access restored, returning to base interval"
            );
            self.state.poll_interval = self.policy.base_interval;
        }

        let transition = if previous != endpoint {
            self.state.active = endpoint;
            tracing::info!(from = %previous, to = %endpoint, "Switched active endpoint");
            Some(Transition {
                from: previous,
                to: endpoint,
            })
        } else {
            None
        };

        metrics::set_poll_interval(self.state.poll_interval);
        metrics::set_active_endpoint(self.state.active);

        FetchedBatch {
            batch,
            endpoint,
            transition,
        }
    }

    fn on_primary_failure(&mut self, err: &FetchError) {
        metrics::record_fetch_error(err);

        match self.policy.cooldown_for(err.kind) {
            Some(cooldown) => {
                if cooldown > self.state.poll_interval {
                    self.state.poll_interval = cooldown;
                }
                tracing::warn!(
                    error = %err,
                    interval_ms = self.state.poll_interval.as_millis() as u64,
                    "Primary endpoint throttled, backing off"
                );
                metrics::set_poll_interval(self.state.poll_interval);
            }
            None => {
                tracing::warn!(error = %err, "Primary endpoint failed, trying secondary");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_cooldowns() {
        let policy = FailoverPolicy::default();
        assert_eq!(policy.blocked_cooldown(), Duration::from_secs(300));
        assert_eq!(policy.rate_limited_cooldown(), Duration::from_secs(120));
        assert_eq!(policy.cooldown_for(FetchErrorKind::HttpError), None);
        assert_eq!(policy.cooldown_for(FetchErrorKind::ParseError), None);
    }

    #[test]
    fn test_initial_state() {
        let state = EndpointState::new(Duration::from_secs(60));
        assert_eq!(state.active, Endpoint::Primary);
        assert_eq!(state.poll_interval, Duration::from_secs(60));
    }

    fn fetcher() -> FailoverFetcher {
        FailoverFetcher::new(
            SourceClient::new().unwrap(),
            EndpointTarget::new(Endpoint::Primary, "http://127.0.0.1:9/primary"),
            EndpointTarget::new(Endpoint::Secondary, "http://127.0.0.1:9/secondary"),
            FailoverPolicy::default(),
        )
    }

    #[test]
    fn test_escalation_never_shortens_interval() {
        let mut fetcher = fetcher();

        fetcher.on_primary_failure(&FetchError::from_status(Endpoint::Primary, 403));
        assert_eq!(fetcher.state().poll_interval, Duration::from_secs(300));

        fetcher.on_primary_failure(&FetchError::from_status(Endpoint::Primary, 429));
        assert_eq!(fetcher.state().poll_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_other_failures_keep_interval() {
        let mut fetcher = fetcher();
        fetcher.on_primary_failure(&FetchError::from_status(Endpoint::Primary, 500));
        assert_eq!(fetcher.state().poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_primary_success_resets_interval() {
        let mut fetcher = fetcher();
        fetcher.on_primary_failure(&FetchError::from_status(Endpoint::Primary, 429));
        assert_eq!(fetcher.state().poll_interval, Duration::from_secs(120));

        let batch = Batch {
            total_event_count: "0".into(),
            total_actor_count: "0".into(),
            events: Vec::new(),
        };
        let fetched = fetcher.on_success(Endpoint::Primary, batch);

        assert!(fetched.transition.is_none());
        assert_eq!(fetcher.state().poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_secondary_success_records_transition() {
        let mut fetcher = fetcher();
        let batch = Batch {
            total_event_count: "0".into(),
            total_actor_count: "0".into(),
            events: Vec::new(),
        };

        let fetched = fetcher.on_success(Endpoint::Secondary, batch.clone());
        assert_eq!(
            fetched.transition,
            Some(Transition {
                from: Endpoint::Primary,
                to: Endpoint::Secondary
            })
        );
        assert_eq!(fetcher.state().active, Endpoint::Secondary);

        let fetched = fetcher.on_success(Endpoint::Secondary, batch);
        assert!(fetched.transition.is_none());
    }
}
