//! Geometric backoff for the retry engine (§3 Retry configuration,
//! §4.3 step 7: "Transient/Unknown: sleep for current backoff, then
//! backoff := min(backoff × multiplier, max_backoff)").

use std::time::Duration;

/// Stateful geometric backoff sequence. Rather than recomputing a delay from
/// an attempt index via `2^(n-1)`, this tracks the current delay explicitly:
/// a `Quota` retry's wait must *not* advance this sequence (§4.3 invariant
/// "Quota waits do not consume exponential backoff growth"), which only an
/// explicit mutable cursor can express cleanly — an index-derived formula
/// would need separate attempt-index bookkeeping to skip quota waits.
#[derive(Debug, Clone)]
pub struct GeometricBackoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl GeometricBackoff {
    /// `multiplier` is clamped to be at least `1.0`; a sub-1 multiplier would
    /// shrink the delay over time, which the retry engine never intends.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self { current: initial.min(max), max, multiplier: multiplier.max(1.0) }
    }

    /// The delay to use for the *next* sleep.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Advance the sequence: `current := min(current * multiplier, max)`.
    pub fn advance(&mut self) {
        let scaled = self.current.mul_f64(self.multiplier);
        self.current = scaled.min(self.max);
    }
}
