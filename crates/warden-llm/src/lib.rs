//! # warden-llm
//!
//! Abstraction over model providers used for candidate rewriting and plan
//! proposals. Every call goes through [`ModelRouter`], which adds retries,
//! a per-provider circuit breaker, fallback and a hard timeout.

pub mod anthropic;
mod http;
pub mod json;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod router;

pub use json::extract_json_object;
pub use mock::MockProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
pub use router::{ChatReply, ChatRequest, ModelRouter, ModelTier, RouterSettings};
