//! Caller-visible error taxonomy for the supervision core (§7).

use std::time::Duration;

use crate::classify::ErrorKind;

/// Cap the number of stored failures inside `Exhausted` to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Errors surfaced to callers of [`crate::Supervisor::call`] and the retry engine.
///
/// Every variant preserves the operation label that failed and, where
/// applicable, the original cause, per §7 ("all surfaced errors preserve the
/// original cause ... and name the operation that failed").
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Network/5xx/deadline-exceeded. Retryable with exponential backoff.
    #[error("{operation}: transient upstream error: {message}")]
    Transient { operation: String, message: String },

    /// 429 / rate limit. Retryable after `recommended_wait`, bounded by `max_quota_wait`.
    #[error(
        "{operation}: quota exceeded, required wait {required:?} exceeds configured ceiling {ceiling:?}"
    )]
    QuotaExceeded { operation: String, required: Duration, ceiling: Duration },

    /// 400 / malformed / 404. Never retried.
    #[error("{operation}: invalid request: {message}")]
    Invalid { operation: String, message: String },

    /// 401 / 403. Never retried.
    #[error("{operation}: authentication/authorization failed: {message}")]
    Auth { operation: String, message: String },

    /// The circuit breaker refused the call.
    #[error(
        "{operation}: circuit breaker open ({failure_weight} weighted failures, opened {opened_for:?} ago)"
    )]
    CircuitOpen { operation: String, failure_weight: usize, opened_for: Duration },

    /// The budget guard refused the call before any attempt was made.
    #[error("{operation}: budget exceeded: {message}")]
    BudgetExceeded { operation: String, message: String },

    /// Caller cancellation observed at a suspension point.
    #[error("{operation}: cancelled")]
    Cancelled { operation: String },

    /// All parser strategies failed. Not produced by the retry engine itself;
    /// domain wrappers may fold a [`crate::parser::ParseResult::Failure`] into this.
    #[error("{context}: failed to parse response: {message}")]
    ParseFailed { context: String, message: String },

    /// `max_retries + 1` attempts all failed.
    #[error("{operation}: exhausted after {attempts} attempts, last error: {last}")]
    Exhausted { operation: String, attempts: usize, last: String, failures: Vec<String> },
}

impl SupervisorError {
    /// The operation label that was passed to `retry_with_backoff`/`call`.
    pub fn operation(&self) -> &str {
        match self {
            Self::Transient { operation, .. }
            | Self::QuotaExceeded { operation, .. }
            | Self::Invalid { operation, .. }
            | Self::Auth { operation, .. }
            | Self::CircuitOpen { operation, .. }
            | Self::BudgetExceeded { operation, .. }
            | Self::Cancelled { operation, .. }
            | Self::Exhausted { operation, .. } => operation,
            Self::ParseFailed { context, .. } => context,
        }
    }

    /// True for the only two kinds the retry engine itself will retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::QuotaExceeded { .. })
    }

    /// The §4.1 classification that produced this error, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Transient { .. } => Some(ErrorKind::Transient),
            Self::QuotaExceeded { .. } => Some(ErrorKind::Quota),
            Self::Invalid { .. } => Some(ErrorKind::Invalid),
            Self::Auth { .. } => Some(ErrorKind::Auth),
            _ => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }
}

/// Truncate `message` to at most `max_len` bytes at a UTF-8 char boundary,
/// appending `...` when truncated. Used for error previews (§4.4).
pub(crate) fn truncate(message: &str, max_len: usize) -> String {
    if message.len() <= max_len {
        message.to_string()
    } else {
        let boundary = (0..=max_len).rev().find(|&i| message.is_char_boundary(i)).unwrap_or(0);
        format!("{}...", &message[..boundary])
    }
}
