use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_core::{Result, WardenError};

use crate::http;
use crate::provider::*;

/// OpenAI-compatible chat completions provider (OpenAI, Azure, vLLM, …).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    #[serde(default)]
    usage: TokenCounts,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct TokenCounts {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: http::client(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            provider_name: "openai".into(),
        }
    }

    /// Use a custom base URL. The name becomes the routing prefix.
    pub fn with_base_url(mut self, url: String, name: String) -> Self {
        self.base_url = url;
        self.provider_name = name;
        self
    }
}

fn build_request(request: &LlmRequest) -> ChatCompletionRequest<'_> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });

    // Reasoning models reject max_tokens.
    let (max_tokens, max_completion_tokens) = if uses_max_completion_tokens(&request.model) {
        (None, Some(request.max_tokens))
    } else {
        (Some(request.max_tokens), None)
    };
    ChatCompletionRequest {
        model: &request.model,
        temperature: request.temperature,
        messages,
        max_tokens,
        max_completion_tokens,
    }
}

fn into_response(data: ChatCompletionResponse, requested_model: &str) -> Result<LlmResponse> {
    let choice = data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| WardenError::LlmParse("chat completion returned no choices".into()))?;
    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        model: data.model.unwrap_or_else(|| requested_model.to_string()),
        usage: Usage {
            input_tokens: data.usage.prompt_tokens,
            output_tokens: data.usage.completion_tokens,
        },
        stop_reason: match choice.finish_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            Some("content_filter") => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        },
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn models(&self) -> Vec<String> {
        vec![
            "gpt-4o".into(),
            "gpt-4o-mini".into(),
            "o3".into(),
            "o3-mini".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        debug!(provider = %self.provider_name, model = %request.model, "sending chat completion request");
        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&build_request(request));
        let data: ChatCompletionResponse = http::send_json(&self.provider_name, builder).await?;
        into_response(data, &request.model)
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(WardenError::LlmProvider(format!(
                "{} API key not set",
                self.provider_name
            )));
        }
        Ok(())
    }
}

fn uses_max_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") || m.contains("gpt-5")
}
