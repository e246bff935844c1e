//! Key selection strategies.
//!
//! `StandardStrategy`, `WeightedStrategy`, and `LatencyStrategy` behind a
//! `Strategy` trait object, so a caller can supply a custom strategy
//! without the engine knowing its concrete type.

use keywheel_types::key::KeyState;
use rand::Rng;

/// Picks one candidate from an already-filtered eligible list. Implementors
/// never see DEAD or on-cooldown keys — that filtering happens in the
/// registry before `next` is called.
pub trait Strategy: Send + Sync {
    fn next(&self, candidates: &[KeyState]) -> Option<KeyState>;
}

/// Sort by `(failCount asc, lastUsed asc)`, pick first. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardStrategy;

impl Strategy for StandardStrategy {
    fn next(&self, candidates: &[KeyState]) -> Option<KeyState> {
        candidates
            .iter()
            .min_by_key(|k| (k.fail_count, k.last_used))
            .cloned()
    }
}

/// Weighted random draw: `r ∈ [0, Σ weights)`, subtract weights in list
/// order until non-positive. Falls back to the first candidate if every
/// weight is zero (or negative weights sum to ≤ 0), matching the reference
/// implementation's loop-exhausted fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedStrategy;

impl Strategy for WeightedStrategy {
    fn next(&self, candidates: &[KeyState]) -> Option<KeyState> {
        if candidates.is_empty() {
            return None;
        }
        let total_weight: f64 = candidates.iter().map(|k| k.weight).sum();
        if total_weight <= 0.0 {
            return Some(candidates[0].clone());
        }

        let mut r = rand::thread_rng().gen_range(0.0..total_weight);
        for k in candidates {
            r -= k.weight;
            if r <= 0.0 {
                return Some(k.clone());
            }
        }
        Some(candidates[0].clone())
    }
}

/// Sort by `(averageLatency asc, lastUsed asc)`, pick first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyStrategy;

impl Strategy for LatencyStrategy {
    fn next(&self, candidates: &[KeyState]) -> Option<KeyState> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.average_latency_ms
                    .total_cmp(&b.average_latency_ms)
                    .then(a.last_used.cmp(&b.last_used))
            })
            .cloned()
    }
}

/// Construct the configured strategy from its kind.
pub fn strategy_for(kind: keywheel_types::config::StrategyKind) -> Box<dyn Strategy> {
    use keywheel_types::config::StrategyKind as S;
    match kind {
        S::Standard => Box::new(StandardStrategy),
        S::Weighted => Box::new(WeightedStrategy),
        S::Latency => Box::new(LatencyStrategy),
    }
}

/// Empty-eligible fallback: among non-DEAD keys, the one with the
/// oldest `failedAt` — closest to recovery. Keys with no `failedAt` (never
/// failed, yet somehow not eligible — shouldn't happen, but defensive) sort
/// last. Returns `None` only if `non_dead` is empty.
pub fn closest_to_recovery(non_dead: &[KeyState]) -> Option<KeyState> {
    non_dead
        .iter()
        .min_by_key(|k| k.failed_at.unwrap_or(u64::MAX))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str, fail_count: u32, last_used: u64) -> KeyState {
        let mut k = KeyState::new(id, 1.0, "default");
        k.fail_count = fail_count;
        k.last_used = last_used;
        k
    }

    #[test]
    fn standard_prefers_fewest_failures_then_stalest_use() {
        let candidates = vec![key("a", 2, 100), key("b", 1, 50), key("c", 1, 10)];
        let picked = StandardStrategy.next(&candidates).unwrap();
        assert_eq!(picked.key, "c");
    }

    #[test]
    fn standard_on_empty_returns_none() {
        assert!(StandardStrategy.next(&[]).is_none());
    }

    #[test]
    fn latency_prefers_lowest_average_latency() {
        let mut a = key("a", 0, 0);
        a.average_latency_ms = 200.0;
        let mut b = key("b", 0, 0);
        b.average_latency_ms = 50.0;
        let picked = LatencyStrategy.next(&[a, b]).unwrap();
        assert_eq!(picked.key, "b");
    }

    #[test]
    fn weighted_with_all_zero_weights_returns_first() {
        let mut a = key("a", 0, 0);
        a.weight = 0.0;
        let mut b = key("b", 0, 0);
        b.weight = 0.0;
        let picked = WeightedStrategy.next(&[a, b]).unwrap();
        assert_eq!(picked.key, "a");
    }

    #[test]
    fn weighted_never_returns_zero_weight_key_when_others_positive() {
        let mut a = key("a", 0, 0);
        a.weight = 0.0;
        let mut b = key("b", 0, 0);
        b.weight = 5.0;
        for _ in 0..50 {
            let picked = WeightedStrategy.next(&[a.clone(), b.clone()]).unwrap();
            assert_eq!(picked.key, "b");
        }
    }

    #[test]
    fn closest_to_recovery_picks_oldest_failed_at() {
        let mut a = key("a", 1, 0);
        a.failed_at = Some(5_000);
        let mut b = key("b", 1, 0);
        b.failed_at = Some(1_000);
        let picked = closest_to_recovery(&[a, b]).unwrap();
        assert_eq!(picked.key, "b");
    }

    #[test]
    fn closest_to_recovery_on_empty_returns_none() {
        assert!(closest_to_recovery(&[]).is_none());
    }
}
