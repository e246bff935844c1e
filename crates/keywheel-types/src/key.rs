//! The per-key identity and health record.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current state of a key in the circuit breaker.
///
/// `Dead` is terminal — no transition ever leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
    Dead,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::Closed
    }
}

/// Milliseconds since the Unix epoch. Plain `u64` so the registry's
/// persisted snapshot round-trips through `serde_json` without a custom
/// (de)serializer, and so tests can fabricate timestamps without a clock.
pub type EpochMillis = u64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Identity and live health record for one credential.
///
/// Identity (`key`, `weight`, `provider`) is immutable after construction;
/// everything else is mutated only by the registry in `keywheel-core`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyState {
    /// Opaque credential identity. Never logged in full — callers should
    /// only surface a redacted suffix (last four characters).
    pub key: String,
    /// Static selection weight, used by the Weighted strategy. Non-negative.
    pub weight: f64,
    /// Provider tag, used to scope selection to a specific upstream.
    pub provider: String,

    /// Circuit breaker state. Starts `Closed`.
    pub circuit_state: CircuitState,
    /// Consecutive failures since the last success. Reset to 0 on success.
    pub fail_count: u32,
    /// Timestamp of the most recent failure, if any.
    pub failed_at: Option<EpochMillis>,
    /// Whether the most recent failure's classification was `Quota`.
    pub is_quota_error: bool,
    /// Per-failure cooldown override. `None` means "use the default for
    /// this key's `is_quota_error` tag", never "retry immediately" — see
    /// the Open Question resolution in DESIGN.md.
    pub custom_cooldown_ms: Option<u64>,
    /// When an `Open` circuit becomes eligible for a `HalfOpen` probe.
    pub half_open_test_time: Option<EpochMillis>,
    /// Timestamp of the most recent selection; tie-breaker for strategies.
    pub last_used: EpochMillis,

    pub success_count: u64,
    pub total_requests: u64,
    pub latency_samples: u64,
    pub total_latency_ms: f64,
    pub average_latency_ms: f64,
}

impl KeyState {
    /// Construct a fresh, healthy key.
    pub fn new(key: impl Into<String>, weight: f64, provider: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            weight,
            provider: provider.into(),
            circuit_state: CircuitState::Closed,
            fail_count: 0,
            failed_at: None,
            is_quota_error: false,
            custom_cooldown_ms: None,
            half_open_test_time: None,
            last_used: 0,
            success_count: 0,
            total_requests: 0,
            latency_samples: 0,
            total_latency_ms: 0.0,
            average_latency_ms: 0.0,
        }
    }

    /// Last four characters of the key, for safe logging.
    pub fn redacted(&self) -> &str {
        let len = self.key.len();
        if len <= 4 {
            &self.key
        } else {
            &self.key[len - 4..]
        }
    }

    pub fn is_dead(&self) -> bool {
        self.circuit_state == CircuitState::Dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_key_is_closed_and_healthy() {
        let k = KeyState::new("sk-abcdef1234", 1.0, "default");
        assert_eq!(k.circuit_state, CircuitState::Closed);
        assert_eq!(k.fail_count, 0);
        assert!(k.failed_at.is_none());
    }

    #[test]
    fn redacted_short_key_returns_whole_key() {
        let k = KeyState::new("abc", 1.0, "default");
        assert_eq!(k.redacted(), "abc");
    }

    #[test]
    fn redacted_long_key_returns_last_four() {
        let k = KeyState::new("sk-abcdef1234", 1.0, "default");
        assert_eq!(k.redacted(), "1234");
    }
}
