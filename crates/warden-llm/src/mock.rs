//! Mock model provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::*;
use warden_core::{Result, WardenError};

/// A mock provider that returns queued responses in order.
///
/// # Example
/// ```
/// use warden_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response(r#"{"candidates": []}"#);
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
    delay: Option<Duration>,
}

/// A pre-configured response from the mock provider.
#[derive(Clone)]
pub struct MockResponse {
    pub text: String,
    pub usage: Usage,
    /// If set, the provider will return this error instead.
    pub error: Option<String>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            error: None,
        }
    }
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
            delay: None,
        }
    }

    /// Queue a text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push_back(MockResponse::text(text));
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().push_back(MockResponse::error(error));
        self
    }

    /// Sleep before answering every request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    pub fn queue_response(&self, resp: MockResponse) {
        self.responses.lock().push_back(resp);
    }

    fn next_response(&self) -> MockResponse {
        self.responses.lock().pop_front().unwrap_or_else(|| MockResponse {
            text: "(mock: no more queued responses)".to_string(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["test-model".to_string()]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mock = self.next_response();

        if let Some(error) = mock.error {
            return Err(WardenError::LlmProvider(error));
        }

        Ok(LlmResponse {
            content: mock.text,
            model: request.model.clone(),
            usage: mock.usage,
            stop_reason: StopReason::EndTurn,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "test".into(),
            system: Some("be terse".into()),
            prompt: "hello".into(),
            max_tokens: 100,
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn test_mock_text_response() {
        let provider = MockProvider::new("mock").with_response("Hello!");
        let resp = provider.complete(&request()).await.unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn test_mock_error() {
        let provider = MockProvider::new("mock").with_error("HTTP 429: rate limited");
        assert!(provider.complete(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let provider = MockProvider::new("mock").with_response("ok");
        let _ = provider.complete(&request()).await;
        let recorded = provider.recorded_requests();
        let recorded = recorded.lock();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].system.as_deref(), Some("be terse"));
    }

    #[tokio::test]
    async fn test_mock_multiple_responses_in_order() {
        let provider = MockProvider::new("mock")
            .with_response("first")
            .with_response("second");
        assert_eq!(provider.complete(&request()).await.unwrap().content, "first");
        assert_eq!(provider.complete(&request()).await.unwrap().content, "second");
        assert!(provider
            .complete(&request())
            .await
            .unwrap()
            .content
            .contains("no more queued"));
    }
}
