//! Lifecycle events emitted by the engine.
//!
//! Event names are part of the public interface; they are represented here
//! as a closed enum rather than the string-keyed subscription set the
//! original implementation used, per the "Design Notes" guidance on typed
//! event taxonomies for strongly typed targets.

use serde::{Deserialize, Serialize};

/// Discriminant used to register a handler for one event variant, without
/// requiring `EngineEvent` itself to be `Hash`/`Eq` (it carries owned
/// `String` payloads that vary per occurrence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineEventKind {
    CircuitOpen,
    CircuitHalfOpen,
    KeyDead,
    KeyRecovered,
    AllKeysExhausted,
    BulkheadRejected,
    Retry,
    Fallback,
    ExecuteSuccess,
    ExecuteFailed,
}

/// One occurrence of a lifecycle event.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A key's circuit breaker tripped to `Open`.
    CircuitOpen { key: String },
    /// A key's cooldown expired; it is eligible for a probe attempt.
    CircuitHalfOpen { key: String },
    /// A key received an `Auth` failure and is permanently excluded.
    KeyDead { key: String },
    /// A `HalfOpen` or `Open` key succeeded and closed its circuit.
    KeyRecovered { key: String },
    /// Selection found no non-dead key at all.
    AllKeysExhausted,
    /// The bulkhead rejected a call before the retry loop started.
    BulkheadRejected,
    /// An attempt failed retryably; another attempt is scheduled.
    Retry {
        key: String,
        attempt: u32,
        delay_ms: u64,
    },
    /// The fallback closure was invoked instead of raising or retrying.
    Fallback { reason: &'static str },
    /// An attempt (or a cache hit, `key == "CACHE_HIT"`) succeeded.
    ExecuteSuccess { key: String, duration_ms: u64 },
    /// An attempt failed; `message` is the classified error's `Display`.
    ExecuteFailed { key: String, message: String },
}

impl EngineEvent {
    pub fn kind(&self) -> EngineEventKind {
        match self {
            Self::CircuitOpen { .. } => EngineEventKind::CircuitOpen,
            Self::CircuitHalfOpen { .. } => EngineEventKind::CircuitHalfOpen,
            Self::KeyDead { .. } => EngineEventKind::KeyDead,
            Self::KeyRecovered { .. } => EngineEventKind::KeyRecovered,
            Self::AllKeysExhausted => EngineEventKind::AllKeysExhausted,
            Self::BulkheadRejected => EngineEventKind::BulkheadRejected,
            Self::Retry { .. } => EngineEventKind::Retry,
            Self::Fallback { .. } => EngineEventKind::Fallback,
            Self::ExecuteSuccess { .. } => EngineEventKind::ExecuteSuccess,
            Self::ExecuteFailed { .. } => EngineEventKind::ExecuteFailed,
        }
    }
}
