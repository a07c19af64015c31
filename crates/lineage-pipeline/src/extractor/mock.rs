//! Canned `LlmClient` for unit tests, grounded on the corpus's pattern of
//! backing an LLM-calling service with a scripted client rather than a live
//! endpoint.

use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{ChatChoice, ChatMessage, ChatRequest, ChatResponse, LlmClient};
use crate::error::LlmTransportError;

/// Returns each queued response in order, then repeats the last one.
/// Records every request it received so tests can assert on re-prompts.
pub struct MockLlmClient {
    responses: Mutex<Vec<String>>,
    received: Mutex<Vec<ChatRequest>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.received.lock().expect("lock not poisoned").len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmTransportError> {
        self.received.lock().expect("lock not poisoned").push(request);
        let mut responses = self.responses.lock().expect("lock not poisoned");
        let content = if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses.first().cloned().unwrap_or_default()
        };
        Ok(ChatResponse {
            choices: vec![ChatChoice {
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content,
                },
            }],
        })
    }
}
