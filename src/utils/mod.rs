//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;

use std::time::Duration;

use rand::Rng;

use self::error::ParseError;

/// Parse a count formatted with grouping whitespace, e.g. `"1 234 567"`
///
/// Any Unicode whitespace is accepted as a separator, which covers the
/// narrow no-break spaces some locales use for digit grouping.
pub fn parse_grouped_count(text: &str) -> Result<u64, ParseError> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    if digits.is_empty() {
        return Err(ParseError::InvalidCount(text.to_string()));
    }

    digits
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidCount(text.to_string()))
}

/// Add a uniformly random extra delay in `[0, max_jitter]` to `base`
pub fn jittered(base: Duration, max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return base;
    }

    let extra_ms = rand::thread_rng().gen_range(0..=max_jitter.as_millis() as u64);
    base + Duration::from_millis(extra_ms)
}
