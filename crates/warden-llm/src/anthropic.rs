use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_core::{Result, WardenError};

use crate::http;
use crate::provider::*;

const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: TokenCounts,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct TokenCounts {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: http::client(),
            api_key,
            base_url: "https://api.anthropic.com/v1".into(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

impl MessagesResponse {
    fn into_response(self, requested_model: &str) -> LlmResponse {
        let content = self
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<String>();
        LlmResponse {
            content,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            usage: Usage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
            },
            stop_reason: match self.stop_reason.as_deref() {
                Some("max_tokens") => StopReason::MaxTokens,
                Some("stop_sequence") => StopReason::StopSequence,
                Some("refusal") => StopReason::ContentFilter,
                _ => StopReason::EndTurn,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "claude-opus-4-20250514".into(),
            "claude-sonnet-4-20250514".into(),
            "claude-haiku-3-5".into(),
        ]
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.as_deref(),
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };
        debug!(model = %request.model, "sending messages request");

        let builder = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);
        let data: MessagesResponse = http::send_json(self.name(), builder).await?;
        Ok(data.into_response(&request.model))
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(WardenError::LlmProvider("ANTHROPIC_API_KEY not set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks_and_maps_stop_reason() {
        let data: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"tool_use","id":"x"},{"type":"text","text":"1}"}],
                "stop_reason":"max_tokens","usage":{"input_tokens":12,"output_tokens":3}}"#,
        )
        .unwrap();
        let resp = data.into_response("claude-haiku-3-5");
        assert_eq!(resp.content, "{\"a\":1}");
        assert_eq!(resp.model, "claude-haiku-3-5");
        assert_eq!(resp.stop_reason, StopReason::MaxTokens);
        assert_eq!(resp.usage.total_tokens(), 15);
    }

    #[test]
    fn request_omits_missing_system_prompt() {
        let body = MessagesRequest {
            model: "claude-haiku-3-5",
            max_tokens: 64,
            temperature: 0.0,
            system: None,
            messages: [Message {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
