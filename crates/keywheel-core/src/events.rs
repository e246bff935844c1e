//! Lifecycle event bus.
//!
//! A `DashMap`-keyed, registration-order, fire-and-forget dispatcher, keyed
//! by the engine's `EngineEventKind`. No handler here can block an execute;
//! the event bus is strictly downstream of decisions the engine has
//! already made.

use dashmap::DashMap;
use keywheel_types::event::{EngineEvent, EngineEventKind};
use std::sync::Arc;

/// Subscriber callback. Must be thread-safe; fires synchronously from
/// whatever task raised the event, so handlers should be cheap (record a
/// metric, log, push to a channel) rather than doing their own I/O.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

impl<F: Fn(&EngineEvent) + Send + Sync> EventHandler for F {
    fn on_event(&self, event: &EngineEvent) {
        self(event)
    }
}

/// Registry of event subscribers, keyed by event kind.
///
/// Thread-safe via `DashMap`. Handlers fire in registration order and never
/// propagate an error back to the caller; a panicking handler is the
/// subscriber's problem, not the engine's to guard against (same contract as
/// `HookRegistry::fire` for its non-blocking events).
pub struct EventBus {
    handlers: DashMap<EngineEventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Subscribe to one event kind.
    pub fn subscribe(&self, kind: EngineEventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn has_subscribers(&self, kind: EngineEventKind) -> bool {
        self.handlers.get(&kind).map(|v| !v.is_empty()).unwrap_or(false)
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(handlers) = self.handlers.get(&event.kind()) {
            for handler in handlers.iter() {
                handler.on_event(&event);
            }
        }
    }

    pub fn emit_circuit_open(&self, key: String) {
        self.emit(EngineEvent::CircuitOpen { key });
    }

    pub fn emit_circuit_half_open(&self, key: String) {
        self.emit(EngineEvent::CircuitHalfOpen { key });
    }

    pub fn emit_key_dead(&self, key: String) {
        self.emit(EngineEvent::KeyDead { key });
    }

    pub fn emit_key_recovered(&self, key: String) {
        self.emit(EngineEvent::KeyRecovered { key });
    }

    pub fn emit_all_keys_exhausted(&self) {
        self.emit(EngineEvent::AllKeysExhausted);
    }

    pub fn emit_bulkhead_rejected(&self) {
        self.emit(EngineEvent::BulkheadRejected);
    }

    pub fn emit_retry(&self, key: String, attempt: u32, delay_ms: u64) {
        self.emit(EngineEvent::Retry {
            key,
            attempt,
            delay_ms,
        });
    }

    pub fn emit_fallback(&self, reason: &'static str) {
        self.emit(EngineEvent::Fallback { reason });
    }

    pub fn emit_execute_success(&self, key: String, duration_ms: u64) {
        self.emit(EngineEvent::ExecuteSuccess { key, duration_ms });
    }

    pub fn emit_execute_failed(&self, key: String, message: String) {
        self.emit(EngineEvent::ExecuteFailed { key, message });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
