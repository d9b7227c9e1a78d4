#![forbid(unsafe_code)]

//! # AI Supervision Core
//!
//! Routes every call to a remote LLM inference service through one
//! disciplined pipeline: error classification, a weighted circuit breaker,
//! bounded concurrency, resilient JSON parsing of semi-structured output, and
//! per-call budget enforcement and usage accounting.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vc_supervisor::prelude::*;
//! use vc_supervisor::client::{ContentBlock, Usage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let response = MessageResponse {
//!         content: vec![ContentBlock { block_type: "text".into(), text: "42".into() }],
//!         usage: Usage { input_tokens: 10, output_tokens: 1 },
//!     };
//!     let client = Arc::new(FakeLlmClient::new(vec![Ok(response)]));
//!
//!     let config = RetryConfig::builder()
//!         .max_retries(3)
//!         .initial_backoff(Duration::from_millis(200))
//!         .max_backoff(Duration::from_secs(10))
//!         .max_quota_wait(Duration::from_secs(60))
//!         .build()
//!         .expect("valid retry config");
//!
//!     let supervisor = Supervisor::new(
//!         client,
//!         "claude-default",
//!         config,
//!         Arc::new(UnlimitedBudget),
//!         Arc::new(InMemoryStorage::new()),
//!     );
//!
//!     let cancel = CancellationToken::new();
//!     let outcome = supervisor.call("what is 6*7?", "analyze", None, None, &cancel).await.unwrap();
//!     assert_eq!(outcome.text, "42");
//! }
//! ```

pub mod backoff;
pub mod budget;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod classify;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod parser;
pub mod retry;
pub mod sleeper;
pub mod storage;
pub mod supervisor;

pub use backoff::GeometricBackoff;
pub use budget::{BudgetError, BudgetTracker, InMemoryBudget, UnlimitedBudget};
pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use classify::{classify, ApiError, Classification, ErrorKind};
pub use client::{FakeLlmClient, LlmClient, Message, MessageRequest, MessageResponse, ReqwestLlmClient};
pub use clock::{Clock, MonotonicClock};
pub use config::{ConfigError, RetryConfig, RetryConfigBuilder};
pub use error::SupervisorError;
pub use parser::{parse, ParseOptions, ParseResult};
pub use retry::RetryEngine;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use storage::{InMemoryStorage, Issue, IssueType, StorageClient, StorageError, UsageRecord};
pub use supervisor::{CallOutcome, Supervisor};

pub mod prelude;
