//! Error kinds surfaced by the engine.

use thiserror::Error;

/// Top-level error returned by `Engine::execute`.
///
/// Generic over `E`, the error type of the caller-supplied `fn`. `Upstream`
/// is the pass-through case: the original error raised by `fn`, re-surfaced
/// unchanged on a non-retryable classification or on retry-cap exhaustion
/// with no fallback configured.
#[derive(Error, Debug)]
pub enum EngineError<E> {
    /// A single attempt exceeded its `timeout_ms` bound.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The bulkhead's concurrency cap was already at capacity.
    #[error("bulkhead capacity exceeded — too many concurrent executes")]
    BulkheadRejection,

    /// Selection returned no key and no fallback was configured.
    #[error("all keys exhausted — no healthy key available")]
    AllKeysExhausted,

    /// `fn`'s own error, re-raised unchanged.
    #[error("{0}")]
    Upstream(E),
}

impl<E> EngineError<E> {
    pub fn is_bulkhead_rejection(&self) -> bool {
        matches!(self, Self::BulkheadRejection)
    }

    pub fn is_all_keys_exhausted(&self) -> bool {
        matches!(self, Self::AllKeysExhausted)
    }
}
