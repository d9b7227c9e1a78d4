//! The remote LLM API (§6): one narrow client trait shaped like the
//! "messages" request/response contract, plus a `reqwest`-backed
//! implementation. No multi-provider abstraction (explicit Non-goal) — this
//! crate talks to exactly one kind of upstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::classify::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

impl MessageResponse {
    /// Concatenate every `"text"` content block, per §4.5.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// The one upstream contract this crate speaks (§6).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn send_message(&self, request: MessageRequest) -> Result<MessageResponse, ApiError>;
}

/// Production client backed by `reqwest`.
pub struct ReqwestLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ReqwestLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl LlmClient for ReqwestLlmClient {
    async fn send_message(&self, request: MessageRequest) -> Result<MessageResponse, ApiError> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();

        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            let mut err = ApiError::new(body).with_status(status);
            for (name, value) in headers {
                err = err.with_header(name, value);
            }
            return Err(err);
        }

        response.json::<MessageResponse>().await.map_err(|e| ApiError::new(e.to_string()))
    }
}

/// A scripted in-memory client for tests: returns queued responses or errors
/// in order, and records every request it received.
pub struct FakeLlmClient {
    responses: Mutex<Vec<Result<MessageResponse, ApiError>>>,
    requests: Mutex<Vec<MessageRequest>>,
}

impl FakeLlmClient {
    pub fn new(responses: Vec<Result<MessageResponse, ApiError>>) -> Self {
        Self { responses: Mutex::new(responses), requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<MessageRequest> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn send_message(&self, request: MessageRequest) -> Result<MessageResponse, ApiError> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).push(request);
        let mut responses = self.responses.lock().unwrap_or_else(|p| p.into_inner());
        if responses.is_empty() {
            return Err(ApiError::new("FakeLlmClient exhausted its scripted responses"));
        }
        responses.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_response(text: &str) -> MessageResponse {
        MessageResponse {
            content: vec![ContentBlock { block_type: "text".into(), text: text.into() }],
            usage: Usage { input_tokens: 10, output_tokens: 5 },
        }
    }

    #[test]
    fn response_text_concatenates_text_blocks_only() {
        let response = MessageResponse {
            content: vec![
                ContentBlock { block_type: "text".into(), text: "hello ".into() },
                ContentBlock { block_type: "tool_use".into(), text: "ignored".into() },
                ContentBlock { block_type: "text".into(), text: "world".into() },
            ],
            usage: Usage { input_tokens: 1, output_tokens: 1 },
        };
        assert_eq!(response.text(), "hello world");
    }

    #[tokio::test]
    async fn fake_client_replays_scripted_responses_in_order() {
        let client = FakeLlmClient::new(vec![Ok(text_response("first")), Ok(text_response("second"))]);
        let request = MessageRequest { model: "m".into(), max_tokens: 100, messages: vec![Message::user("hi")] };

        let first = client.send_message(request.clone()).await.unwrap();
        assert_eq!(first.text(), "first");
        let second = client.send_message(request).await.unwrap();
        assert_eq!(second.text(), "second");
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn fake_client_errors_once_exhausted() {
        let client = FakeLlmClient::new(vec![]);
        let request = MessageRequest { model: "m".into(), max_tokens: 1, messages: vec![] };
        assert!(client.send_message(request).await.is_err());
    }
}
