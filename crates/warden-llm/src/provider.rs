use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_core::Result;

/// A single-turn request to a model provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The model to use, provider-specific part only (e.g. "claude-sonnet-4-20250514").
    pub model: String,
    /// System prompt.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A complete response from a provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Trait implemented by each model provider (Anthropic, OpenAI-compatible, mock).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Routing name, matched against the "provider/" prefix of a model string.
    fn name(&self) -> &str;

    /// List known models.
    fn models(&self) -> Vec<String>;

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this provider is configured / reachable.
    async fn health_check(&self) -> Result<()>;
}
