//! Core data structures for the flash feed
//!
//! Wire names follow the upstream payload (`flash_id`, `timestamp`,
//! `with_paris`, ...) while the Rust field names describe what the values mean.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::time::Instant;

use crate::utils::error::ParseError;
use crate::utils::parse_grouped_count;

/// One occurrence reported by the upstream source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier, the dedupe key
    #[serde(rename = "flash_id", deserialize_with = "string_or_number")]
    pub id: String,

    /// Seconds since epoch, assigned by the source
    #[serde(rename = "timestamp")]
    pub occurred_at: i64,

    /// Who produced the event
    #[serde(rename = "player", default)]
    pub actor: String,

    /// Where it happened
    #[serde(rename = "city", default)]
    pub location: String,

    /// Relative image path on the upstream asset host
    #[serde(rename = "img", default)]
    pub payload_ref: String,

    #[serde(rename = "text", default)]
    pub caption: String,
}

/// One snapshot returned by a single fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Total event count as formatted by the source, e.g. `"1 234"`
    #[serde(rename = "flash_count", deserialize_with = "string_or_number")]
    pub total_event_count: String,

    /// Total actor count as formatted by the source
    #[serde(rename = "player_count", deserialize_with = "string_or_number")]
    pub total_actor_count: String,

    /// Events in upstream order, not sorted by time
    #[serde(rename = "with_paris", default)]
    pub events: Vec<Event>,
}

impl Batch {
    /// Parse the whitespace-grouped summary counters
    pub fn stats(&self) -> Result<FeedStats, ParseError> {
        Ok(FeedStats {
            total_events: parse_grouped_count(&self.total_event_count)?,
            total_actors: parse_grouped_count(&self.total_actor_count)?,
        })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Parsed summary counters of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub total_events: u64,
    pub total_actors: u64,
}

/// An event with its computed delivery instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledDelivery {
    pub event: Event,

    /// Monotonic instant at which the event becomes due
    pub deliver_at: Instant,

    /// Copy of `event.occurred_at`
    pub occurred_at: i64,
}

/// Upstream endpoint identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    #[default]
    Primary,
    Secondary,
}

impl Endpoint {
    /// Lowercase identifier used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Display name for the presentation layer
    pub fn label(&self) -> &'static str {
        match self {
            Self::Primary => "Primary",
            Self::Secondary => "Secondary",
        }
    }

    /// Gauge value for the active endpoint metric
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Primary => 0.0,
            Self::Secondary => 1.0,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accept either a JSON string or a JSON number and keep it as text
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}
