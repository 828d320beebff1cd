//! Exponential backoff between retry attempts.
//!
//! The first retry fires immediately; every later retry waits
//! `factor * 2^(n-1)` where `n` is the 1-based retry number, clamped to a
//! ceiling. With the default factor of 3 seconds the sequence is
//! 0s, 6s, 12s, 24s, ...

use std::time::Duration;

/// Default multiplier applied to the exponential term.
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(3);

/// Upper bound on any single backoff sleep.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Delay to sleep before retry number `retry` (1-based).
///
/// `retry == 0` (no retry yet) and `retry == 1` both yield zero.
pub fn backoff_delay(factor: Duration, retry: u32, max: Duration) -> Duration {
    if retry <= 1 {
        return Duration::ZERO;
    }
    let exponent = (retry - 1).min(31);
    factor
        .checked_mul(1u32 << exponent)
        .unwrap_or(max)
        .min(max)
}
