//! Weighted circuit breaker (§4.2): a three-state fault-isolation gate
//! guarding the upstream LLM API, shared by every concurrent caller in the
//! process.
//!
//! State lives behind a single `Mutex` rather than a set of independent
//! atomics, per design note §9 ("model as an object owning a mutex ... no
//! lock-free tricks required — contention is low, one acquisition per API
//! call"). Every public method — including read-only introspection — takes
//! the lock, so [`CircuitBreaker::snapshot`] always observes a coherent
//! triple of `(state, failure_weight, success_count)`, which a split of
//! independent atomics cannot guarantee under concurrent access.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::classify::ErrorKind;
use crate::clock::{Clock, MonotonicClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Configuration for a [`CircuitBreaker`], mirroring §3's fields.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub open_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// A breaker that never trips: `failure_threshold` is effectively infinite.
    pub fn disabled() -> Self {
        Self { failure_threshold: usize::MAX, success_threshold: 1, open_timeout: Duration::ZERO }
    }
}

/// The weight a failure of a given [`ErrorKind`] contributes toward tripping
/// the breaker (§4.2 "Failure weighting"). `Auth`/`Invalid` are not recorded
/// at all — callers should simply not invoke [`CircuitBreaker::record_failure`]
/// for those kinds.
pub fn failure_weight(kind: ErrorKind) -> Option<usize> {
    match kind {
        ErrorKind::Quota => Some(3),
        ErrorKind::Transient | ErrorKind::Unknown => Some(1),
        ErrorKind::Auth | ErrorKind::Invalid => None,
    }
}

/// Outcome of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Refused { failure_weight: usize, opened_for: Duration },
}

/// Coherent read of the breaker's current state, taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_weight: usize,
    pub success_count: usize,
}

struct Inner {
    state: CircuitState,
    failure_weight: usize,
    success_count: usize,
    last_failure_at_millis: Option<u64>,
    last_state_change_at_millis: u64,
    /// HalfOpen admits exactly one in-flight probe at a time (§4.2: "one
    /// probe at a time; implementation may serialize").
    half_open_probe_in_flight: bool,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_weight: 0,
                success_count: 0,
                last_failure_at_millis: None,
                last_state_change_at_millis: now,
                half_open_probe_in_flight: false,
            }),
            config,
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask the breaker whether a new call may proceed. Transitions
    /// `Open -> HalfOpen` when `open_timeout` has elapsed.
    pub fn try_acquire(&self) -> Admission {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let opened_at = inner.last_state_change_at_millis;
                let elapsed = now.saturating_sub(opened_at);
                if elapsed >= self.config.open_timeout.as_millis() as u64 {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_state_change_at_millis = now;
                    inner.success_count = 0;
                    inner.half_open_probe_in_flight = true;
                    tracing::info!("circuit breaker -> half-open");
                    Admission::Allowed
                } else {
                    Admission::Refused {
                        failure_weight: inner.failure_weight,
                        opened_for: Duration::from_millis(elapsed),
                    }
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    Admission::Refused { failure_weight: inner.failure_weight, opened_for: Duration::ZERO }
                } else {
                    inner.half_open_probe_in_flight = true;
                    Admission::Allowed
                }
            }
        }
    }

    /// Record a successful attempt.
    ///
    /// - `Closed`: reset `failure_count` to zero (invariant from §3: "in
    ///   Closed, success_count = 0").
    /// - `HalfOpen`: increment `success_count`; close and reset once it
    ///   reaches `success_threshold`.
    pub fn record_success(&self) {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_weight = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_probe_in_flight = false;
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_weight = 0;
                    inner.success_count = 0;
                    inner.last_state_change_at_millis = now;
                    tracing::info!("circuit breaker -> closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a weighted failure (§4.2). `kind` must be a weighted kind —
    /// callers should check [`failure_weight`] before calling this; `Auth`/
    /// `Invalid` failures are never recorded.
    pub fn record_failure(&self, kind: ErrorKind) {
        let Some(weight) = failure_weight(kind) else {
            return;
        };
        let now = self.clock.now_millis();
        let mut inner = self.lock();
        inner.last_failure_at_millis = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.failure_weight += weight;
                if inner.failure_weight >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_state_change_at_millis = now;
                    tracing::warn!(
                        failure_weight = inner.failure_weight,
                        threshold = self.config.failure_threshold,
                        "circuit breaker -> open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.half_open_probe_in_flight = false;
                // a half-open failure reopens with counters reset to just this failure.
                inner.state = CircuitState::Open;
                inner.failure_weight = weight;
                inner.success_count = 0;
                inner.last_state_change_at_millis = now;
                tracing::warn!("circuit breaker: half-open probe failed -> open");
            }
            CircuitState::Open => {}
        }
    }

    /// A coherent snapshot of the breaker's current state, taken under the lock.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_weight: inner.failure_weight,
            success_count: inner.success_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone)]
    struct ManualClock {
        now: Arc<AtomicU64>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self { now: Arc::new(AtomicU64::new(0)) }
        }

        fn advance(&self, millis: u64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    fn config(failure_threshold: usize, success_threshold: usize, open_timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig { failure_threshold, success_threshold, open_timeout }
    }

    #[test]
    fn starts_closed_and_allows_calls() {
        let breaker = CircuitBreaker::new(config(5, 1, Duration::from_secs(1)));
        assert_eq!(breaker.try_acquire(), Admission::Allowed);
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[test]
    fn quota_failures_weighted_at_three_trip_faster() {
        // threshold 5: two Quota failures (3+3=6) should trip, matching scenario 3 in §8.
        let breaker = CircuitBreaker::new(config(5, 2, Duration::from_millis(50)));
        breaker.record_failure(ErrorKind::Quota);
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        breaker.record_failure(ErrorKind::Quota);
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
        assert_eq!(breaker.snapshot().failure_weight, 6);
    }

    #[test]
    fn transient_failures_weighted_at_one() {
        let breaker = CircuitBreaker::new(config(3, 1, Duration::from_secs(1)));
        breaker.record_failure(ErrorKind::Transient);
        breaker.record_failure(ErrorKind::Unknown);
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        breaker.record_failure(ErrorKind::Transient);
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn auth_and_invalid_failures_are_never_recorded() {
        let breaker = CircuitBreaker::new(config(1, 1, Duration::from_secs(1)));
        breaker.record_failure(ErrorKind::Auth);
        breaker.record_failure(ErrorKind::Invalid);
        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_weight, 0);
    }

    #[test]
    fn open_refuses_until_timeout_then_half_opens() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock(config(1, 1, Duration::from_millis(100)), Arc::new(clock.clone()));

        breaker.record_failure(ErrorKind::Transient);
        assert_eq!(breaker.snapshot().state, CircuitState::Open);
        assert!(matches!(breaker.try_acquire(), Admission::Refused { .. }));

        clock.advance(150);
        assert_eq!(breaker.try_acquire(), Admission::Allowed);
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold_consecutive_successes() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock(config(1, 2, Duration::from_millis(50)), Arc::new(clock.clone()));

        breaker.record_failure(ErrorKind::Transient);
        clock.advance(100);
        assert_eq!(breaker.try_acquire(), Admission::Allowed); // probe 1
        breaker.record_success();
        assert_eq!(breaker.snapshot().state, CircuitState::HalfOpen, "needs 2 successes to close");

        assert_eq!(breaker.try_acquire(), Admission::Allowed); // probe 2
        breaker.record_success();
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        assert_eq!(breaker.snapshot().success_count, 0);
    }

    #[test]
    fn half_open_reopens_immediately_on_probe_failure() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock(config(1, 1, Duration::from_millis(50)), Arc::new(clock.clone()));

        breaker.record_failure(ErrorKind::Transient);
        clock.advance(100);
        assert_eq!(breaker.try_acquire(), Admission::Allowed);
        breaker.record_failure(ErrorKind::Transient);

        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.failure_weight, 1, "counters reset to just this failure");
    }

    #[test]
    fn half_open_serializes_to_one_probe_at_a_time() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock(config(1, 1, Duration::from_millis(50)), Arc::new(clock.clone()));

        breaker.record_failure(ErrorKind::Transient);
        clock.advance(100);

        assert_eq!(breaker.try_acquire(), Admission::Allowed);
        assert!(matches!(breaker.try_acquire(), Admission::Refused { .. }), "second probe rejected");
    }

    #[test]
    fn success_in_closed_state_resets_failure_count() {
        let breaker = CircuitBreaker::new(config(3, 1, Duration::from_secs(1)));
        breaker.record_failure(ErrorKind::Transient);
        breaker.record_failure(ErrorKind::Transient);
        breaker.record_success();
        assert_eq!(breaker.snapshot().failure_weight, 0);

        breaker.record_failure(ErrorKind::Transient);
        breaker.record_failure(ErrorKind::Transient);
        assert_eq!(breaker.snapshot().state, CircuitState::Closed, "reset count, not yet at threshold again");
    }

    #[test]
    fn disabled_breaker_never_opens() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::disabled());
        for _ in 0..1000 {
            breaker.record_failure(ErrorKind::Quota);
        }
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        assert_eq!(breaker.try_acquire(), Admission::Allowed);
    }
}
