//! Configuration management for flashfeed
//!
//! This module handles loading and validating configuration from environment variables,
//! TOML files, and command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default upstream JSON API
pub const DEFAULT_PRIMARY_URL: &str = "https://api.space-invaders.com/flashinvaders/flashes/";

/// Default upstream HTML page embedding the same data
pub const DEFAULT_SECONDARY_URL: &str = "https://www.space-invaders.com/flashinvaders/";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream source configuration
    pub source: SourceConfig,

    /// Polling and replay pacing
    pub pacing: PacingConfig,

    /// Relay server configuration
    pub relay: RelayConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Primary endpoint URL (JSON API or relay `/api/primary`)
    pub primary_url: String,

    /// Secondary endpoint URL (HTML page or relay `/api/fallback`)
    pub secondary_url: String,

    /// Send browser-like headers; disable when polling a trusted local relay
    pub browser_headers: bool,

    /// User agent sent with browser headers
    pub user_agent: String,

    /// Additional headers sent on every request
    pub extra_headers: BTreeMap<String, String>,

    /// Request timeout in seconds; `None` keeps the HTTP client default
    pub request_timeout_secs: Option<u64>,
}

/// Polling interval, backoff and replay pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Base polling interval in milliseconds
    pub base_poll_interval_ms: u64,

    /// Replay tick period in milliseconds
    pub tick_period_ms: u64,

    /// Lead time before the first replayed event, in milliseconds
    pub lead_time_ms: u64,

    /// Maximum events forwarded to the presentation layer per render pass
    pub max_render_events: usize,

    /// Interval multiplier applied when the primary endpoint answers 403
    pub blocked_backoff_factor: u32,

    /// Interval multiplier applied when the primary endpoint answers 429
    pub rate_limited_backoff_factor: u32,

    /// Upper bound of the random delay added to each poll, in milliseconds
    pub poll_jitter_ms: u64,
}

/// Relay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Upstream JSON API proxied at `/api/primary`
    pub primary_upstream: String,

    /// Upstream HTML page proxied at `/api/fallback`
    pub fallback_upstream: String,

    /// Upstream timeout for the primary proxy, in seconds
    pub primary_timeout_secs: u64,

    /// Upstream timeout for the fallback proxy, in seconds
    pub fallback_timeout_secs: u64,

    /// Maximum upstream requests per minute, shared by both routes
    pub upstream_requests_per_minute: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            primary_url: DEFAULT_PRIMARY_URL.to_string(),
            secondary_url: DEFAULT_SECONDARY_URL.to_string(),
            browser_headers: true,
            user_agent: crate::source::headers::DESKTOP_USER_AGENT.to_string(),
            extra_headers: BTreeMap::new(),
            request_timeout_secs: None,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_poll_interval_ms: 60_000,
            tick_period_ms: 500,
            lead_time_ms: 1_000,
            max_render_events: 50,
            blocked_backoff_factor: 5,
            rate_limited_backoff_factor: 2,
            poll_jitter_ms: 5_000,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
            primary_upstream: DEFAULT_PRIMARY_URL.to_string(),
            fallback_upstream: DEFAULT_SECONDARY_URL.to_string(),
            primary_timeout_secs: 10,
            fallback_timeout_secs: 15,
            upstream_requests_per_minute: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparseable variables fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let source = SourceConfig {
            primary_url: std::env::var("FLASHFEED_PRIMARY_URL")
                .unwrap_or(defaults.source.primary_url),
            secondary_url: std::env::var("FLASHFEED_SECONDARY_URL")
                .unwrap_or(defaults.source.secondary_url),
            browser_headers: env_parse("FLASHFEED_BROWSER_HEADERS")
                .unwrap_or(defaults.source.browser_headers),
            user_agent: std::env::var("FLASHFEED_USER_AGENT")
                .unwrap_or(defaults.source.user_agent),
            extra_headers: defaults.source.extra_headers,
            request_timeout_secs: env_parse("FLASHFEED_REQUEST_TIMEOUT"),
        };

        let pacing = PacingConfig {
            base_poll_interval_ms: env_parse("FLASHFEED_POLL_INTERVAL_MS")
                .unwrap_or(defaults.pacing.base_poll_interval_ms),
            tick_period_ms: env_parse("FLASHFEED_TICK_MS")
                .unwrap_or(defaults.pacing.tick_period_ms),
            lead_time_ms: env_parse("FLASHFEED_LEAD_TIME_MS")
                .unwrap_or(defaults.pacing.lead_time_ms),
            max_render_events: env_parse("FLASHFEED_MAX_RENDER_EVENTS")
                .unwrap_or(defaults.pacing.max_render_events),
            poll_jitter_ms: env_parse("FLASHFEED_POLL_JITTER_MS")
                .unwrap_or(defaults.pacing.poll_jitter_ms),
            ..defaults.pacing
        };

        // PORT is what container platforms inject
        let relay = RelayConfig {
            port: env_parse("FLASHFEED_RELAY_PORT")
                .or_else(|| env_parse("PORT"))
                .unwrap_or(defaults.relay.port),
            ..defaults.relay
        };

        let logging = LoggingConfig {
            level: std::env::var("FLASHFEED_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("FLASHFEED_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            source,
            pacing,
            relay,
            logging,
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.source.primary_url)
            .with_context(|| format!("Invalid primary_url: {}", self.source.primary_url))?;
        Url::parse(&self.source.secondary_url)
            .with_context(|| format!("Invalid secondary_url: {}", self.source.secondary_url))?;

        if self.pacing.base_poll_interval_ms == 0 {
            anyhow::bail!("base_poll_interval_ms must be greater than 0");
        }

        if self.pacing.tick_period_ms == 0 {
            anyhow::bail!("tick_period_ms must be greater than 0");
        }

        if self.pacing.tick_period_ms >= self.pacing.base_poll_interval_ms {
            anyhow::bail!("tick_period_ms must be shorter than base_poll_interval_ms");
        }

        if self.pacing.max_render_events == 0 {
            anyhow::bail!("max_render_events must be greater than 0");
        }

        if self.pacing.blocked_backoff_factor < 2 || self.pacing.rate_limited_backoff_factor < 2 {
            anyhow::bail!("backoff factors must be at least 2");
        }

        if self.source.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be greater than 0 when set");
        }

        Ok(())
    }

    /// Validate the relay section only
    pub fn validate_relay(&self) -> Result<()> {
        Url::parse(&self.relay.primary_upstream).context("Invalid relay primary_upstream")?;
        Url::parse(&self.relay.fallback_upstream).context("Invalid relay fallback_upstream")?;

        if self.relay.upstream_requests_per_minute == 0 {
            anyhow::bail!("upstream_requests_per_minute must be greater than 0");
        }

        Ok(())
    }

    /// Base polling interval as Duration
    #[must_use]
    pub fn base_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pacing.base_poll_interval_ms)
    }

    /// Replay tick period as Duration
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.pacing.tick_period_ms)
    }

    /// Replay lead time as Duration
    #[must_use]
    pub fn lead_time(&self) -> Duration {
        Duration::from_millis(self.pacing.lead_time_ms)
    }

    /// Maximum poll jitter as Duration
    #[must_use]
    pub fn poll_jitter(&self) -> Duration {
        Duration::from_millis(self.pacing.poll_jitter_ms)
    }

    /// Request timeout, if one is configured
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.source.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.validate_relay().is_ok());
    }

    #[test]
    fn test_default_pacing() {
        let config = Config::default();
        assert_eq!(config.base_poll_interval(), Duration::from_secs(60));
        assert_eq!(config.tick_period(), Duration::from_millis(500));
        assert_eq!(config.lead_time(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_invalid_poll_interval() {
        let mut config = Config::default();
        config.pacing.base_poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_must_be_shorter_than_poll() {
        let mut config = Config::default();
        config.pacing.tick_period_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.source.secondary_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_factor_floor() {
        let mut config = Config::default();
        config.pacing.blocked_backoff_factor = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [source]
            primary_url = "http://localhost:8080/api/primary"
            browser_headers = false

            [pacing]
            base_poll_interval_ms = 30000
            "#,
        )
        .unwrap();

        assert_eq!(config.source.primary_url, "http://localhost:8080/api/primary");
        assert!(!config.source.browser_headers);
        assert_eq!(config.source.secondary_url, DEFAULT_SECONDARY_URL);
        assert_eq!(config.pacing.base_poll_interval_ms, 30_000);
        assert_eq!(config.pacing.tick_period_ms, 500);
        assert_eq!(config.relay.port, 8080);
    }
}
