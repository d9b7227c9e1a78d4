//! Convenience re-exports for downstream crates.

pub use crate::budget::{BudgetError, BudgetTracker, InMemoryBudget, UnlimitedBudget};
pub use crate::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use crate::classify::{classify, ApiError, ErrorKind};
pub use crate::client::{FakeLlmClient, LlmClient, Message, MessageRequest, MessageResponse, ReqwestLlmClient};
pub use crate::config::{ConfigError, RetryConfig, RetryConfigBuilder};
pub use crate::error::SupervisorError;
pub use crate::parser::{parse, ParseOptions, ParseResult};
pub use crate::storage::{InMemoryStorage, Issue, IssueType, StorageClient, StorageError, UsageRecord};
pub use crate::supervisor::{CallOutcome, Supervisor};
pub use tokio_util::sync::CancellationToken;
