//! The error classifier's output type and tunable constants.

use serde::{Deserialize, Serialize};

/// Taxonomy of classified failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Quota,
    Transient,
    Auth,
    BadRequest,
    Safety,
    Recitation,
    Timeout,
    Unknown,
}

/// The classifier's verdict for one raised error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassification {
    pub error_type: ErrorType,
    pub retryable: bool,
    /// Cooldown the breaker should apply, in milliseconds. `None` for
    /// `Auth` — its cooldown value is moot, since the key goes straight to
    /// `Dead`, which never consults a cooldown.
    pub cooldown_ms: Option<u64>,
    pub mark_key_failed: bool,
    pub mark_key_dead: bool,
}

/// Tunable constants driving cooldown policy and backoff.
pub mod constants {
    /// Cooldown for transient/timeout/unknown failures.
    pub const COOLDOWN_TRANSIENT_MS: u64 = 60_000;
    /// Cooldown for quota (429) failures.
    pub const COOLDOWN_QUOTA_MS: u64 = 300_000;
    /// Defined but not referenced by any classification rule — a hook for
    /// a future "daily quota" distinction.
    pub const COOLDOWN_QUOTA_DAILY_MS: u64 = 3_600_000;
    /// Delay before an `Open` circuit becomes eligible for a `HalfOpen` probe.
    pub const HALF_OPEN_TEST_DELAY_MS: u64 = 60_000;
    /// Base of the exponential backoff between retries.
    pub const BASE_BACKOFF_MS: u64 = 1_000;
    /// Cap on the exponential backoff between retries, before jitter.
    pub const MAX_BACKOFF_MS: u64 = 64_000;
    /// Consecutive failures before a `Closed` circuit opens.
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
}
