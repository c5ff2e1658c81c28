//! Replay scheduling
//!
//! Newly discovered events are not shown the moment a poll returns them.
//! They are queued here and released at the same relative spacing they
//! originally happened with, which turns one batch per minute into a steady
//! trickle of live-looking updates.
//!
//! # Architecture
//!
//! ```text
//!   poll ──► DedupeStore ──► ReplayScheduler::enqueue(new, now)
//!                                      │
//!                                      ▼
//!                         pending (deliver_at, seq) ──► tick(now) ──► sink
//! ```
//!
//! # Modules
//!
//! - [`replay`] - ordered pending buffer and the enqueue/tick operations
//! - [`clock`] - injectable monotonic time source
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use flashfeed::scheduler::ReplayScheduler;
//! use tokio::time::Instant;
//!
//! let mut scheduler = ReplayScheduler::new(Duration::from_secs(1));
//! let now = Instant::now();
//! scheduler.enqueue(Vec::new(), now);
//! assert!(scheduler.tick(now + Duration::from_secs(5)).is_empty());
//! ```

pub mod clock;
pub mod replay;

pub use clock::{Clock, ManualClock, TokioClock};
pub use replay::ReplayScheduler;
