//! Retry engine (§4.3): the single entry point that orchestrates budget
//! checks, the circuit breaker, bounded concurrency, attempts, classification,
//! and backoff into one call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backoff::GeometricBackoff;
use crate::budget::BudgetTracker;
use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig};
use crate::classify::{classify, ApiError, ErrorKind, DEFAULT_QUOTA_WAIT};
use crate::clock::Clock;
use crate::config::RetryConfig;
use crate::error::{SupervisorError, MAX_RETRY_FAILURES};
use crate::sleeper::{Sleeper, TokioSleeper};

/// Orchestrates one call per [`RetryEngine::retry_with_backoff`] invocation,
/// following the ordered steps of §4.3.
pub struct RetryEngine {
    config: RetryConfig,
    circuit_breaker: Option<CircuitBreaker>,
    bulkhead: Bulkhead,
    budget: Arc<dyn BudgetTracker>,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryEngine {
    pub fn new(config: RetryConfig, budget: Arc<dyn BudgetTracker>) -> Self {
        Self::build(config, budget, Arc::new(TokioSleeper), None)
    }

    pub fn with_sleeper(config: RetryConfig, budget: Arc<dyn BudgetTracker>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self::build(config, budget, sleeper, None)
    }

    /// For tests that need a manual [`Clock`] to drive circuit-breaker timing.
    pub fn with_clock(
        config: RetryConfig,
        budget: Arc<dyn BudgetTracker>,
        sleeper: Arc<dyn Sleeper>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(config, budget, sleeper, Some(clock))
    }

    fn build(config: RetryConfig, budget: Arc<dyn BudgetTracker>, sleeper: Arc<dyn Sleeper>, clock: Option<Arc<dyn Clock>>) -> Self {
        let breaker_config = if config.circuit_breaker_enabled {
            CircuitBreakerConfig {
                failure_threshold: config.failure_threshold,
                success_threshold: config.success_threshold,
                open_timeout: config.open_timeout,
            }
        } else {
            CircuitBreakerConfig::disabled()
        };

        let circuit_breaker = Some(match clock {
            Some(clock) => CircuitBreaker::with_clock(breaker_config, clock),
            None => CircuitBreaker::new(breaker_config),
        });

        let bulkhead = Bulkhead::new(config.max_concurrent_calls);
        Self { config, circuit_breaker, bulkhead, budget, sleeper }
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.circuit_breaker.as_ref()
    }

    /// Run `attempt_fn` under the full §4.3 pipeline.
    pub async fn retry_with_backoff<F, Fut, T>(
        &self,
        operation_label: &str,
        cancel: &CancellationToken,
        attempt_fn: F,
    ) -> Result<T, SupervisorError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let op = operation_label.to_string();

        // Step 1: concurrency slot, released on drop on every exit path.
        let _permit = match self.bulkhead.acquire(cancel).await {
            Some(permit) => permit,
            None => return Err(SupervisorError::Cancelled { operation: op }),
        };

        let mut backoff = GeometricBackoff::new(self.config.initial_backoff, self.config.max_backoff, self.config.backoff_multiplier);
        let mut failures: Vec<String> = Vec::new();
        let total_attempts = self.config.max_retries + 1;

        for attempt in 0..total_attempts {
            // Step 2: budget check, every attempt — a ceiling crossed by a
            // concurrent caller mid-retry (e.g. during a quota wait) must be
            // caught before the next attempt, not just before the first one.
            if let Err(budget_err) = self.budget.check_budget(operation_label).await {
                return Err(SupervisorError::BudgetExceeded { operation: op, message: budget_err.reason });
            }

            // Step 3: circuit gate.
            if let Some(breaker) = &self.circuit_breaker {
                if let Admission::Refused { failure_weight, opened_for } = breaker.try_acquire() {
                    return Err(SupervisorError::CircuitOpen { operation: op, failure_weight, opened_for });
                }
            }

            if cancel.is_cancelled() {
                return Err(SupervisorError::Cancelled { operation: op });
            }

            // Step 4: per-attempt deadline.
            match self.run_attempt(&attempt_fn, cancel).await {
                // Step 5: success.
                Ok(value) => {
                    if let Some(breaker) = &self.circuit_breaker {
                        breaker.record_success();
                    }
                    if attempt > 0 {
                        tracing::info!(operation = operation_label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                // Step 6: classify, then step 7: dispatch.
                Err(api_err) => {
                    let classification = classify(Some(&api_err));
                    push_bounded(&mut failures, api_err.message.clone());

                    match classification.kind {
                        ErrorKind::Auth => {
                            return Err(SupervisorError::Auth { operation: op, message: api_err.message })
                        }
                        ErrorKind::Invalid => {
                            return Err(SupervisorError::Invalid { operation: op, message: api_err.message })
                        }
                        ErrorKind::Quota => {
                            if let Some(breaker) = &self.circuit_breaker {
                                breaker.record_failure(ErrorKind::Quota);
                            }
                            let required = classification.wait.unwrap_or(DEFAULT_QUOTA_WAIT);
                            if required > self.config.max_quota_wait {
                                return Err(SupervisorError::QuotaExceeded {
                                    operation: op,
                                    required,
                                    ceiling: self.config.max_quota_wait,
                                });
                            }
                            if attempt + 1 < total_attempts {
                                if !self.sleep_cancellable(required, cancel).await {
                                    return Err(SupervisorError::Cancelled { operation: op });
                                }
                                // quota waits do not consume backoff growth.
                                continue;
                            }
                        }
                        ErrorKind::Transient | ErrorKind::Unknown => {
                            if let Some(breaker) = &self.circuit_breaker {
                                breaker.record_failure(classification.kind);
                            }
                            if attempt + 1 < total_attempts {
                                let delay = backoff.current();
                                if !self.sleep_cancellable(delay, cancel).await {
                                    return Err(SupervisorError::Cancelled { operation: op });
                                }
                                backoff.advance();
                                continue;
                            }
                        }
                    }
                }
            }
        }

        // Step 8: exhaustion.
        Err(SupervisorError::Exhausted {
            operation: op,
            attempts: total_attempts,
            last: failures.last().cloned().unwrap_or_default(),
            failures,
        })
    }

    /// Run one attempt under `per_attempt_timeout`, racing cancellation.
    /// Both a timeout and a cancellation here classify as `Transient`
    /// (§5: "the error is classified normally, Transient for deadline-exceeded"),
    /// so the surrounding retry loop decides whether to retry exactly as it
    /// would for any other transient failure.
    async fn run_attempt<F, Fut, T>(&self, attempt_fn: &F, cancel: &CancellationToken) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::new("attempt cancelled (deadline exceeded)")),
            result = tokio::time::timeout(self.config.per_attempt_timeout, attempt_fn()) => match result {
                Ok(inner) => inner,
                Err(_elapsed) => Err(ApiError::new("per-attempt timeout exceeded (deadline exceeded)")),
            },
        }
    }

    async fn sleep_cancellable(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.sleeper.sleep(delay) => true,
        }
    }
}

fn push_bounded(failures: &mut Vec<String>, message: String) {
    failures.push(message);
    if failures.len() > MAX_RETRY_FAILURES {
        failures.remove(0);
    }
}
