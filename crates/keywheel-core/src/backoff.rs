//! Retry backoff computation.
//!
//! Exponential-with-cap backoff plus additive (not multiplicative) jitter:
//! `min(BASE · 2^a, MAX) + uniform(0, 1000)`. Uses `rand` directly, which is
//! already pulled in for the weighted selector strategy.

use keywheel_types::classification::constants::{BASE_BACKOFF_MS, MAX_BACKOFF_MS};
use rand::Rng;

/// Delay before retry attempt `attempt` (0-indexed), in milliseconds.
///
/// `attempt` is the index of the attempt that just failed; the sleep
/// happens before attempt `attempt + 1`.
pub fn backoff_ms(attempt: u32) -> u64 {
    let exp = BASE_BACKOFF_MS.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    let capped = exp.min(MAX_BACKOFF_MS);
    let jitter = rand::thread_rng().gen_range(0..=1_000u64);
    capped + jitter
}
