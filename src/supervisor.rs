//! Supervisor facade (§4.5): the single "call the LLM with a prompt" entry
//! point every domain wrapper uses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::budget::BudgetTracker;
use crate::client::{LlmClient, Message, MessageRequest};
use crate::config::RetryConfig;
use crate::error::SupervisorError;
use crate::retry::RetryEngine;
use crate::storage::{StorageClient, UsageRecord};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const USAGE_COMMENT_AUTHOR: &str = "supervisor";

/// The response text plus everything needed to build a [`UsageRecord`] for
/// it. `call()` doesn't know which issue (if any) a call should be billed
/// against, so it hands this back rather than logging usage itself; pair it
/// with [`Supervisor::log_usage`] to actually record it (§3 "Usage record").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub text: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration: Duration,
}

/// Owns the client, model identifier, retry engine (breaker + bulkhead +
/// backoff), budget tracker, and storage handle, per §4.5.
pub struct Supervisor {
    client: Arc<dyn LlmClient>,
    default_model: String,
    retry_engine: RetryEngine,
    storage: Arc<dyn StorageClient>,
}

impl Supervisor {
    pub fn new(
        client: Arc<dyn LlmClient>,
        default_model: impl Into<String>,
        config: RetryConfig,
        budget: Arc<dyn BudgetTracker>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            client,
            default_model: default_model.into(),
            retry_engine: RetryEngine::new(config, budget),
            storage,
        }
    }

    /// Send `prompt` through the full retry/breaker/bulkhead pipeline and
    /// return the concatenated text of the response alongside its usage data
    /// (§4.5, data flow: "C5 (extract text, record usage)"). Most callers
    /// that don't need usage logging can just take `.text`.
    pub async fn call(
        &self,
        prompt: &str,
        operation_label: &str,
        model: Option<&str>,
        max_tokens: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<CallOutcome, SupervisorError> {
        let model = model.unwrap_or(&self.default_model).to_string();
        let max_tokens = max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let request = MessageRequest { model: model.clone(), max_tokens, messages: vec![Message::user(prompt)] };

        let started = Instant::now();
        let response = self
            .retry_engine
            .retry_with_backoff(operation_label, cancel, || {
                let client = self.client.clone();
                let request = request.clone();
                async move { client.send_message(request).await }
            })
            .await?;
        let duration = started.elapsed();

        tracing::info!(
            operation = operation_label,
            model = %model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            duration_ms = duration.as_millis() as u64,
            "call completed"
        );

        Ok(CallOutcome {
            text: response.text(),
            model,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            duration,
        })
    }

    /// Append a usage record as a best-effort comment (§4.5). A missing
    /// issue is a silent no-op; a storage failure is a warning, never
    /// propagated to the caller.
    pub async fn log_usage(&self, issue_id: &str, activity_label: &str, outcome: &CallOutcome) {
        if self.storage.get_issue(issue_id).await.is_none() {
            return;
        }

        let record = UsageRecord {
            issue_id: issue_id.to_string(),
            activity_label: activity_label.to_string(),
            input_tokens: outcome.input_tokens,
            output_tokens: outcome.output_tokens,
            duration: outcome.duration,
            model: outcome.model.clone(),
        };
        let text = format!(
            "{activity_label}: {} in / {} out tokens, {}ms, model {}",
            record.input_tokens,
            record.output_tokens,
            record.duration.as_millis(),
            record.model
        );

        if let Err(err) = self.storage.add_comment(issue_id, USAGE_COMMENT_AUTHOR, &text).await {
            tracing::warn!(issue_id, activity_label, error = %err, "failed to log usage comment");
        }
    }
}
