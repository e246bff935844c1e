//! Bulkhead: a bounded counter of in-flight executes.
//!
//! `tokio::sync::Semaphore`'s `try_acquire` gives fail-fast semantics — no
//! queueing, immediate rejection once the cap is hit — unlike
//! `acquire().await`, which would block callers instead of surfacing
//! `BulkheadRejection`.

use tokio::sync::{Semaphore, TryAcquireError};

/// Holds the acquired permit for the lifetime of one retry loop; dropping it
/// releases the slot on every exit path (success, failure, or panic).
pub struct BulkheadGuard {
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

/// Caps concurrent in-flight `execute` calls. `None` cap means unbounded —
/// `acquire` always succeeds without touching a semaphore at all.
pub struct Bulkhead {
    semaphore: Option<std::sync::Arc<Semaphore>>,
}

impl Bulkhead {
    pub fn new(max_concurrency: Option<u32>) -> Self {
        let semaphore = max_concurrency.map(|n| std::sync::Arc::new(Semaphore::new(n as usize)));
        Self { semaphore }
    }

    /// Attempt to admit one execute. `Ok(guard)` on success; `Err(())` means
    /// the cap was already saturated and the caller should fail fast with
    /// `BulkheadRejection`.
    pub fn try_acquire(&self) -> Result<BulkheadGuard, ()> {
        match &self.semaphore {
            None => Ok(BulkheadGuard { _permit: None }),
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Ok(BulkheadGuard {
                    _permit: Some(permit),
                }),
                Err(TryAcquireError::NoPermits) => Err(()),
                Err(TryAcquireError::Closed) => Err(()),
            },
        }
    }

    /// Number of currently available slots. `None` for an unbounded bulkhead.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}
