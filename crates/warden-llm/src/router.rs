use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse, Usage};
use warden_core::{Result, WardenError};

/// Maximum retry attempts for transient errors (429, 500, 502, 503).
const MAX_RETRIES: u32 = 3;
/// Base delay for exponential backoff (doubles each retry).
const BASE_DELAY_MS: u64 = 1000;

// ── Circuit Breaker ────────────────────────────────────────────

/// Number of consecutive failures before opening the circuit.
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
/// How long the circuit stays open before allowing a probe request.
const CIRCUIT_OPEN_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    /// Provider is failing; reject requests immediately.
    Open { since: Instant },
    /// Allow a single probe request to test if the provider recovered.
    HalfOpen,
}

#[derive(Debug)]
struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
        }
    }

    fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open { since } => {
                if since.elapsed() >= CIRCUIT_OPEN_DURATION {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            // Already probing
            CircuitState::HalfOpen => false,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= CIRCUIT_FAILURE_THRESHOLD
            || self.state == CircuitState::HalfOpen
        {
            self.state = CircuitState::Open {
                since: Instant::now(),
            };
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.state, CircuitState::Open { .. })
    }
}

// ── Chat surface ───────────────────────────────────────────────

/// Which configured model a chat request should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheap model for short rewrites.
    Fast,
    /// Strongest configured model, used for planning.
    #[default]
    Best,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model_tier: ModelTier,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub usage: Usage,
}

/// Model selection and limits applied by [`ModelRouter::chat_completion`].
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// "provider/model" used for [`ModelTier::Best`].
    pub best_model: String,
    /// "provider/model" used for [`ModelTier::Fast`]; falls back to `best_model`.
    pub fast_model: Option<String>,
    pub fallback_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Hard bound on a whole chat completion, retries included.
    pub timeout: Duration,
    pub retry_base_delay: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            best_model: "anthropic/claude-sonnet-4-20250514".into(),
            fast_model: None,
            fallback_model: None,
            max_tokens: 2048,
            temperature: 0.2,
            timeout: Duration::from_secs(20),
            retry_base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }
}

/// Routes model requests to the correct provider, with automatic failover.
#[derive(Clone)]
pub struct ModelRouter {
    providers: Vec<Arc<dyn LlmProvider>>,
    /// Circuit breakers keyed by provider name.
    breakers: Arc<Mutex<HashMap<String, CircuitBreaker>>>,
    settings: RouterSettings,
}

/// Check if an error is transient and worth retrying.
fn is_retryable(err: &WardenError) -> bool {
    match err {
        WardenError::RateLimited { .. } => true,
        WardenError::LlmProvider(msg) => {
            msg.starts_with("HTTP 429")
                || msg.starts_with("HTTP 500")
                || msg.starts_with("HTTP 502")
                || msg.starts_with("HTTP 503")
                || msg.starts_with("HTTP 529")
                || msg.contains("timed out")
                || msg.contains("connection reset")
                || msg.contains("connection closed")
                || msg.contains("overloaded")
        }
        _ => false,
    }
}

/// Extract retry-after hint from a RateLimited error (in seconds).
fn retry_after_hint(err: &WardenError) -> Option<u64> {
    if let WardenError::RateLimited { retry_after_secs } = err {
        Some(*retry_after_secs)
    } else {
        None
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(RouterSettings::default())
    }
}

impl ModelRouter {
    pub fn new(settings: RouterSettings) -> Self {
        Self {
            providers: vec![],
            breakers: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    /// Register a provider.
    pub fn add_provider(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        info!(provider = %name, "registered LLM provider");
        self.breakers
            .lock()
            .entry(name)
            .or_insert_with(CircuitBreaker::new);
        self.providers.push(provider);
    }

    /// Whether any provider is registered. Model-assisted paths are skipped when false.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    fn is_available(&self, provider_name: &str) -> bool {
        let mut breakers = self.breakers.lock();
        breakers
            .get_mut(provider_name)
            .map(|cb| cb.allow_request())
            .unwrap_or(true)
    }

    fn record_success(&self, provider_name: &str) {
        if let Some(cb) = self.breakers.lock().get_mut(provider_name) {
            cb.record_success();
        }
    }

    fn record_failure(&self, provider_name: &str) {
        let mut breakers = self.breakers.lock();
        if let Some(cb) = breakers.get_mut(provider_name) {
            let was_open = cb.is_open();
            cb.record_failure();
            if !was_open && cb.is_open() {
                warn!(
                    provider = provider_name,
                    failures = cb.consecutive_failures,
                    "circuit breaker OPEN, provider disabled for {}s",
                    CIRCUIT_OPEN_DURATION.as_secs()
                );
            }
        }
    }

    /// Find the provider for a model string like "anthropic/claude-sonnet-4-20250514".
    fn resolve(&self, model: &str) -> Option<(Arc<dyn LlmProvider>, String)> {
        if let Some((prefix, model_name)) = model.split_once('/') {
            for p in &self.providers {
                if p.name().eq_ignore_ascii_case(prefix) {
                    return Some((Arc::clone(p), model_name.to_string()));
                }
            }
        }
        // Bare model name: try each provider's model list
        for p in &self.providers {
            if p.models().iter().any(|m| m == model) {
                return Some((Arc::clone(p), model.to_string()));
            }
        }
        None
    }

    /// Complete a request, with retry on transient errors and failover to the fallback model.
    pub async fn complete(
        &self,
        request: &LlmRequest,
        fallback_model: Option<&str>,
    ) -> Result<LlmResponse> {
        self.complete_routed(request, fallback_model)
            .await
            .map(|(_, resp)| resp)
    }

    async fn complete_routed(
        &self,
        request: &LlmRequest,
        fallback_model: Option<&str>,
    ) -> Result<(String, LlmResponse)> {
        let mut primary_err = None;
        if let Some((provider, model_name)) = self.resolve(&request.model) {
            if self.is_available(provider.name()) {
                let mut req = request.clone();
                req.model = model_name;

                match self.complete_with_retry(&*provider, &req).await {
                    Ok(resp) => {
                        self.record_success(provider.name());
                        return Ok((provider.name().to_string(), resp));
                    }
                    Err(e) => {
                        self.record_failure(provider.name());
                        warn!(
                            provider = provider.name(),
                            error = %e,
                            "primary provider failed after retries, attempting failover"
                        );
                        primary_err = Some(e);
                    }
                }
            } else {
                warn!(
                    provider = provider.name(),
                    "circuit breaker is OPEN, skipping to fallback"
                );
            }
        }

        if let Some(fallback) = fallback_model
            && let Some((provider, model_name)) = self.resolve(fallback)
            && self.is_available(provider.name())
        {
            let mut req = request.clone();
            req.model = model_name;
            return match self.complete_with_retry(&*provider, &req).await {
                Ok(resp) => {
                    self.record_success(provider.name());
                    Ok((provider.name().to_string(), resp))
                }
                Err(e) => {
                    self.record_failure(provider.name());
                    Err(e)
                }
            };
        }

        Err(primary_err.unwrap_or_else(|| WardenError::ModelNotFound(request.model.clone())))
    }

    /// Retry a complete() call with exponential backoff on transient errors.
    async fn complete_with_retry(
        &self,
        provider: &dyn LlmProvider,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let base_ms = self.settings.retry_base_delay.as_millis() as u64;
        let mut attempt = 0;
        loop {
            match provider.complete(request).await {
                Ok(resp) => return Ok(resp),
                Err(e) if is_retryable(&e) && attempt < MAX_RETRIES => {
                    let delay = retry_after_hint(&e)
                        .map(|s| s * 1000)
                        .unwrap_or(base_ms * 2u64.pow(attempt));
                    warn!(
                        provider = provider.name(),
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        delay_ms = delay,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One system/user exchange on the requested tier, bounded by the configured timeout.
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatReply> {
        if !self.has_providers() {
            return Err(WardenError::LlmProvider("no model provider configured".into()));
        }
        let model = match request.model_tier {
            ModelTier::Fast => self
                .settings
                .fast_model
                .clone()
                .unwrap_or_else(|| self.settings.best_model.clone()),
            ModelTier::Best => self.settings.best_model.clone(),
        };
        let llm_request = LlmRequest {
            model,
            system: Some(request.system_prompt.clone()),
            prompt: request.user_prompt.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let timeout = self.settings.timeout;
        let fallback = self.settings.fallback_model.as_deref();
        let (provider, resp) =
            tokio::time::timeout(timeout, self.complete_routed(&llm_request, fallback))
                .await
                .map_err(|_| WardenError::LlmTimeout {
                    timeout_secs: timeout.as_secs(),
                })??;

        debug!(
            provider = %provider,
            model = %resp.model,
            tokens = resp.usage.total_tokens(),
            "chat completion finished"
        );
        Ok(ChatReply {
            content: resp.content,
            provider,
            model: resp.model,
            usage: resp.usage,
        })
    }
}
