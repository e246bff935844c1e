//! Key registry and per-key circuit breaker.
//!
//! A `DashMap`-backed registry keyed by key identity, carrying a per-key
//! health record (latency stats, weight, explicit `Dead` terminal state)
//! and the cooldown-to-probe transition a circuit breaker needs.

use dashmap::DashMap;
use keywheel_types::classification::{constants::*, ErrorClassification, ErrorType};
use keywheel_types::config::InitialKey;
use keywheel_types::key::{now_ms, CircuitState, KeyState};
use tracing::{debug, error, info, warn};

use crate::events::EventBus;

/// Aggregate counts for a health snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub healthy: usize,
    pub cooling: usize,
    pub dead: usize,
}

/// Owns every key's identity and mutable health state.
///
/// Thread-safe via `DashMap`. Per-key read-modify-write sequences (the
/// cooldown check-then-transition, mark_success, mark_failed) take the
/// single entry's guard for their whole critical section, giving per-key
/// linearizability without a registry-wide lock.
pub struct KeyRegistry {
    keys: DashMap<String, KeyState>,
    /// Preserves construction order for strategies that want a stable
    /// iteration order (and for `all()` snapshots used in tests).
    order: Vec<String>,
}

impl KeyRegistry {
    /// Build a registry from the manager's construction-time key list.
    /// String entries may be comma-separated; de-duplicated by identity,
    /// first occurrence wins.
    pub fn new(initial_keys: Vec<InitialKey>) -> Self {
        let mut order = Vec::new();
        let keys = DashMap::new();

        let mut insert = |id: String, weight: f64, provider: String| {
            if id.is_empty() || keys.contains_key(&id) {
                return;
            }
            order.push(id.clone());
            keys.insert(id.clone(), KeyState::new(id, weight, provider));
        };

        for entry in initial_keys {
            match entry {
                InitialKey::Plain(raw) => {
                    for part in raw.split(',') {
                        let trimmed = part.trim();
                        if !trimmed.is_empty() {
                            insert(trimmed.to_string(), 1.0, "default".to_string());
                        }
                    }
                }
                InitialKey::Detailed {
                    key,
                    weight,
                    provider,
                } => {
                    let trimmed = key.trim();
                    if !trimmed.is_empty() {
                        insert(trimmed.to_string(), weight, provider);
                    }
                }
            }
        }

        Self { keys, order }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Snapshot of every key's current state, in construction order.
    pub fn all(&self) -> Vec<KeyState> {
        self.order
            .iter()
            .filter_map(|id| self.keys.get(id).map(|r| r.clone()))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<KeyState> {
        self.keys.get(id).map(|r| r.clone())
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.order.len(),
            ..Default::default()
        };
        for id in &self.order {
            if let Some(k) = self.keys.get(id) {
                match k.circuit_state {
                    CircuitState::Dead => stats.dead += 1,
                    CircuitState::Closed => stats.healthy += 1,
                    CircuitState::Open | CircuitState::HalfOpen => {
                        if self.is_on_cooldown_locked(&k) {
                            stats.cooling += 1;
                        } else {
                            stats.healthy += 1;
                        }
                    }
                }
            }
        }
        stats
    }

    /// Non-dead keys, optionally scoped to a provider, that are NOT
    /// currently on cooldown. Performs the lazy `Open` → `HalfOpen`
    /// transition as a side effect of the cooldown check.
    pub fn eligible(&self, provider: Option<&str>, events: &EventBus) -> Vec<KeyState> {
        let mut result = Vec::new();
        for id in &self.order {
            let Some(mut entry) = self.keys.get_mut(id) else {
                continue;
            };
            if let Some(p) = provider {
                if entry.provider != p {
                    continue;
                }
            }
            if entry.is_dead() {
                continue;
            }
            if !self.is_on_cooldown(&mut entry, events) {
                result.push(entry.clone());
            }
        }
        result
    }

    /// All non-dead keys, scoped to a provider if given, regardless of
    /// cooldown — used by the empty-eligible fallback.
    pub fn non_dead(&self, provider: Option<&str>) -> Vec<KeyState> {
        self.order
            .iter()
            .filter_map(|id| self.keys.get(id).map(|r| r.clone()))
            .filter(|k| !k.is_dead())
            .filter(|k| provider.is_none_or(|p| k.provider == p))
            .collect()
    }

    /// Mark `id` as selected: bump `last_used` to now.
    pub fn touch_selected(&self, id: &str) {
        if let Some(mut k) = self.keys.get_mut(id) {
            k.last_used = now_ms();
        }
    }

    /// Record a successful attempt (HALF_OPEN/OPEN → CLOSED, emits `keyRecovered`).
    pub fn mark_success(&self, id: &str, duration_ms: Option<f64>, events: &EventBus) {
        let Some(mut k) = self.keys.get_mut(id) else {
            return;
        };

        let was_recovering = !matches!(k.circuit_state, CircuitState::Closed | CircuitState::Dead);
        if was_recovering {
            info!(key = k.redacted(), "key recovered, closing circuit");
            events.emit_key_recovered(id.to_string());
        }

        k.circuit_state = CircuitState::Closed;
        k.fail_count = 0;
        k.failed_at = None;
        k.is_quota_error = false;
        k.custom_cooldown_ms = None;
        k.success_count += 1;
        k.total_requests += 1;

        if let Some(d) = duration_ms {
            k.total_latency_ms += d;
            k.latency_samples += 1;
            k.average_latency_ms = k.total_latency_ms / k.latency_samples as f64;
        }
    }

    /// Record a failed attempt (CLOSED → OPEN/DEAD, HALF_OPEN → OPEN).
    pub fn mark_failed(&self, id: &str, classification: &ErrorClassification, events: &EventBus) {
        let Some(mut k) = self.keys.get_mut(id) else {
            return;
        };
        if k.is_dead() || !classification.mark_key_failed {
            return;
        }

        let now = now_ms();
        k.failed_at = Some(now);
        k.fail_count += 1;
        k.total_requests += 1;
        k.is_quota_error = classification.error_type == ErrorType::Quota;
        k.custom_cooldown_ms = classification.cooldown_ms;

        if classification.mark_key_dead {
            k.circuit_state = CircuitState::Dead;
            error!(key = k.redacted(), "key permanently dead (auth failure)");
            events.emit_key_dead(id.to_string());
            return;
        }

        if k.circuit_state == CircuitState::HalfOpen {
            k.circuit_state = CircuitState::Open;
            k.half_open_test_time = Some(now + HALF_OPEN_TEST_DELAY_MS);
            warn!(key = k.redacted(), "probe failed, circuit re-opened");
            events.emit_circuit_open(id.to_string());
        } else if k.fail_count >= MAX_CONSECUTIVE_FAILURES || classification.error_type == ErrorType::Quota
        {
            k.circuit_state = CircuitState::Open;
            let cooldown = classification.cooldown_ms.unwrap_or(HALF_OPEN_TEST_DELAY_MS);
            k.half_open_test_time = Some(now + cooldown);
            warn!(
                key = k.redacted(),
                fail_count = k.fail_count,
                "circuit opened"
            );
            events.emit_circuit_open(id.to_string());
        }
    }

    /// True if `Dead`, or `Open` with the cooldown
    /// window still active (transitioning to `HalfOpen` and returning false
    /// if the window has elapsed), or a custom/default cooldown since the
    /// last failure hasn't elapsed yet.
    fn is_on_cooldown(&self, k: &mut KeyState, events: &EventBus) -> bool {
        if k.is_dead() {
            return true;
        }

        let now = now_ms();

        if k.circuit_state == CircuitState::Open {
            if let Some(test_time) = k.half_open_test_time {
                if now >= test_time {
                    k.circuit_state = CircuitState::HalfOpen;
                    debug!(key = k.redacted(), "cooldown elapsed, probing");
                    events.emit_circuit_half_open(k.key.clone());
                    return false;
                }
            }
            return true;
        }

        if let Some(failed_at) = k.failed_at {
            let cooldown = k.custom_cooldown_ms.unwrap_or(if k.is_quota_error {
                COOLDOWN_QUOTA_MS
            } else {
                COOLDOWN_TRANSIENT_MS
            });
            if now.saturating_sub(failed_at) < cooldown {
                return true;
            }
        }

        false
    }

    /// Read-only cooldown check for `stats()` — never mutates, never emits.
    fn is_on_cooldown_locked(&self, k: &KeyState) -> bool {
        if k.is_dead() {
            return true;
        }
        let now = now_ms();
        if k.circuit_state == CircuitState::Open {
            return k.half_open_test_time.is_none_or(|t| now < t);
        }
        if let Some(failed_at) = k.failed_at {
            let cooldown = k.custom_cooldown_ms.unwrap_or(if k.is_quota_error {
                COOLDOWN_QUOTA_MS
            } else {
                COOLDOWN_TRANSIENT_MS
            });
            return now.saturating_sub(failed_at) < cooldown;
        }
        false
    }

    /// Overwrite in-memory state from a persisted snapshot, by identity.
    /// Unknown keys in the snapshot are ignored; known keys absent from it
    /// retain their defaults.
    pub fn restore(&self, snapshot: std::collections::HashMap<String, KeyState>) {
        for id in &self.order {
            if let Some(state) = snapshot.get(id) {
                if let Some(mut k) = self.keys.get_mut(id) {
                    *k = state.clone();
                }
            }
        }
    }

    /// A full snapshot suitable for persisting through a `StorageAdapter`.
    pub fn snapshot(&self) -> std::collections::HashMap<String, KeyState> {
        self.order
            .iter()
            .filter_map(|id| self.keys.get(id).map(|r| (id.clone(), r.clone())))
            .collect()
    }
}
