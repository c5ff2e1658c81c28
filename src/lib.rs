//! flashfeed - flash event feed ingester
//!
//! Polls a remote feed of timestamped "flash" events, fails over between a
//! primary JSON endpoint and a secondary HTML endpoint, drops events it has
//! already seen and replays new ones at their original spacing.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`source`] - Upstream HTTP client, header profiles and failover
//! - [`parser`] - JSON and HTML-embedded payload parsing
//! - [`models`] - Core data structures and types
//! - [`storage`] - In-memory deduplication
//! - [`scheduler`] - Replay scheduling and the injectable clock
//! - [`sink`] - Presentation collaborators
//! - [`pipeline`] - Batch handling and the ingestion loop
//! - [`relay`] - CORS relay server in front of the upstream
//! - [`status`] - Status and metrics endpoint
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use flashfeed::config::Config;
//! use flashfeed::pipeline::IngestionLoop;
//! use flashfeed::sink::LogSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let ingestion = IngestionLoop::from_config(&config, LogSink::new())?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     ingestion.run(shutdown_rx).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod relay;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod status;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, FeedErrorTrait, Result};
    pub use crate::models::{Batch, Endpoint, Event, FeedStats, ScheduledDelivery};
    pub use crate::pipeline::{FeedStatus, IngestionLoop, LoopSettings};
    pub use crate::scheduler::{Clock, ManualClock, ReplayScheduler, TokioClock};
    pub use crate::sink::{LogSink, PresentationSink};
    pub use crate::source::{FailoverFetcher, SourceClient};
    pub use crate::storage::DedupeStore;
}

// Direct re-exports for convenience
pub use models::{Batch, Endpoint, Event};
