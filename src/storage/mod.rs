//! In-process state kept across poll cycles
//!
//! Nothing here is persisted; a restart begins with an empty seen set and the
//! next batch is treated as an initial load.

pub mod dedup;

pub use dedup::{DedupeStore, Partition};
