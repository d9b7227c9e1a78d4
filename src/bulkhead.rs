//! Bounded concurrency across the process (§5): a cancellation-aware
//! semaphore gate in front of every upstream call.
//!
//! §5 requires callers to *wait* for a slot rather than be rejected
//! immediately when the limit is reached — rejection only happens via
//! cancellation, never via "bulkhead full." Waiting is composed with a
//! [`CancellationToken`] via `tokio::select!` so a cancelled caller does not
//! block forever.

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

/// A permit held for the duration of one in-flight call. Dropping it frees
/// the slot for the next waiter.
pub struct BulkheadPermit<'a> {
    _permit: Option<SemaphorePermit<'a>>,
}

/// Bounded concurrency gate. `max_concurrent_calls == 0` disables the
/// bulkhead entirely (§5 implementation note): no semaphore is constructed
/// and every `acquire` returns immediately.
pub enum Bulkhead {
    Unbounded,
    Bounded(Arc<Semaphore>),
}

impl Bulkhead {
    pub fn new(max_concurrent_calls: usize) -> Self {
        if max_concurrent_calls == 0 {
            Bulkhead::Unbounded
        } else {
            Bulkhead::Bounded(Arc::new(Semaphore::new(max_concurrent_calls)))
        }
    }

    /// Wait for a slot, or return `None` if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<BulkheadPermit<'_>> {
        match self {
            Bulkhead::Unbounded => Some(BulkheadPermit { _permit: None }),
            Bulkhead::Bounded(semaphore) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire() => {
                        Some(BulkheadPermit { _permit: Some(permit.expect("semaphore never closed")) })
                    }
                }
            }
        }
    }

    /// Number of calls currently allowed to proceed without waiting.
    /// `None` for an unbounded bulkhead.
    pub fn available_permits(&self) -> Option<usize> {
        match self {
            Bulkhead::Unbounded => None,
            Bulkhead::Bounded(semaphore) => Some(semaphore.available_permits()),
        }
    }
}
