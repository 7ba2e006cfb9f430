use thiserror::Error;

/// Unified error type for the entire Warden control plane.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Signal errors ──────────────────────────────────────────
    #[error("signal source {name} failed: {reason}")]
    SignalSource { name: String, reason: String },

    #[error("signal source {name} timed out after {timeout_ms}ms")]
    SourceTimeout { name: String, timeout_ms: u64 },

    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("llm request timed out after {timeout_secs}s")]
    LlmTimeout { timeout_secs: u64 },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("llm response could not be parsed: {0}")]
    LlmParse(String),

    // ── Planning errors ────────────────────────────────────────
    #[error("planning failed: {0}")]
    Planning(String),

    #[error("plan rejected: {code}: {message}")]
    PlanRejected { code: String, message: String },

    // ── Policy errors ──────────────────────────────────────────
    #[error("policy denied: {reason_code}: {message}")]
    PolicyDenied { reason_code: String, message: String },

    #[error("human approval required: {0}")]
    HumanApprovalRequired(String),

    // ── Queue errors ───────────────────────────────────────────
    #[error("invalid goal transition for {goal_id}: {from} -> {to}")]
    InvalidTransition {
        goal_id: String,
        from: String,
        to: String,
    },

    #[error("goal not found: {0}")]
    GoalNotFound(String),

    // ── Execution errors ───────────────────────────────────────
    #[error("collaborator error: {collaborator}: {reason}")]
    Collaborator { collaborator: String, reason: String },

    #[error("step execution failed: {action}: {reason}")]
    Execution { action: String, reason: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("state store error: {0}")]
    Store(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    /// Shorthand for a failing external collaborator.
    pub fn collaborator(collaborator: &str, reason: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
