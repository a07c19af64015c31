//! Transport for the LLM extraction calls: an OpenAI-compatible
//! `/chat/completions` client behind a trait object, so the extractor logic
//! stays testable without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ExtractorConfig;
use crate::error::LlmTransportError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl ChatResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Transport seam for chat-completion calls. Implemented against a real
/// HTTP endpoint by `ReqwestLlmClient` and against canned responses by
/// `MockLlmClient` in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmTransportError>;
}

/// `reqwest`-backed client against an OpenAI-compatible endpoint.
pub struct ReqwestLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ReqwestLlmClient {
    pub fn new(cfg: &ExtractorConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .expect("reqwest client builds with valid config");
        Self {
            http,
            base_url: cfg.api_base_url.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[async_trait]
impl LlmClient for ReqwestLlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmTransportError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmTransportError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmTransportError::InvalidJson(e.to_string()))
    }
}
