use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub agent: AgentConfig,
    pub autonomy: AutonomyConfig,
    pub goal_manager: GoalManagerConfig,
    pub signals: SignalsConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
}

// ── Agent (model provider) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model used for the `best` tier, e.g. "anthropic/claude-sonnet-4-20250514".
    pub model: String,
    /// Model used for the `fast` tier (candidate rewriting).
    pub fast_model: Option<String>,
    /// Fallback model for when the primary provider is unavailable.
    pub fallback_model: Option<String>,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Hard timeout for a single chat completion, including retries.
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4-20250514".into(),
            fast_model: Some("anthropic/claude-haiku-3-5".into()),
            fallback_model: None,
            max_tokens: 2048,
            temperature: 0.2,
            request_timeout_secs: 20,
        }
    }
}

// ── Autonomy / policy ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    /// Autonomy level 0-5 (A0 manual … A5 maximal autonomy).
    pub level: u8,
    /// Minimum candidate confidence for runs that write.
    pub min_confidence_write: f64,
    /// Minimum candidate confidence for dry runs.
    pub min_confidence_dry_run: f64,
    /// Block every infrastructure write.
    pub read_only_mode: bool,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            level: 2,
            min_confidence_write: 0.75,
            min_confidence_dry_run: 0.5,
            read_only_mode: true,
        }
    }
}

// ── Goal manager ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalManagerConfig {
    /// Master switch for ticks and dispatch.
    pub enabled: bool,
    /// Dispatch additionally requires this flag.
    pub dispatch_enabled: bool,
    /// Let a model rewrite rule-generated candidate text.
    pub llm_enhancement_enabled: bool,
    /// Let a model propose plans before the rule template.
    pub llm_planner_enabled: bool,
    /// Default dry-run mode for dispatched plans.
    pub dry_run: bool,
    /// Default write permission for dispatched plans.
    pub allow_writes: bool,
    pub tick_interval_secs: u64,
    pub dispatch_interval_secs: u64,
    /// Queued goals expire this long after admission.
    pub goal_ttl_secs: u64,
    /// A held active-goal pointer older than this is superseded.
    pub stale_running_secs: u64,
    pub max_replan_attempts: u32,
    pub max_llm_candidates: usize,
    /// How far back `duplicate_goal` looks in candidate history.
    pub dedup_window_secs: u64,
    pub min_candidate_confidence: f64,
    pub max_signal_age_secs: u64,
    /// Failovers inside the lookback window that trigger a recover goal.
    pub failover_threshold: usize,
    /// Average utilization (percent) below which capacity counts as idle.
    pub cost_utilization_floor: f64,
    /// Peak vCPU at or above which capacity counts as over-provisioned.
    pub cost_peak_vcpu_floor: f64,
    /// Latest CPU (percent) below which the system counts as quiet.
    pub low_cpu_ceiling: f64,
    /// Rows returned by `state` listings by default.
    pub state_list_limit: usize,
}

impl Default for GoalManagerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dispatch_enabled: false,
            llm_enhancement_enabled: true,
            llm_planner_enabled: true,
            dry_run: true,
            allow_writes: false,
            tick_interval_secs: 60,
            dispatch_interval_secs: 30,
            goal_ttl_secs: 3600,
            stale_running_secs: 900,
            max_replan_attempts: 2,
            max_llm_candidates: 3,
            dedup_window_secs: 1800,
            min_candidate_confidence: 0.5,
            max_signal_age_secs: 300,
            failover_threshold: 2,
            cost_utilization_floor: 40.0,
            cost_peak_vcpu_floor: 4.0,
            low_cpu_ceiling: 35.0,
            state_list_limit: 50,
        }
    }
}

// ── Signals ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    /// Chain flavour recorded on every snapshot ("optimism", "arbitrum", …).
    pub chain_type: String,
    pub metrics_samples: usize,
    pub anomaly_event_limit: usize,
    pub failover_lookback_secs: u64,
    pub usage_days: u32,
    pub memory_lookback_secs: u64,
    pub memory_limit: usize,
    /// Per-source time box.
    pub source_timeout_ms: u64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            chain_type: "optimism".into(),
            metrics_samples: 30,
            anomaly_event_limit: 50,
            failover_lookback_secs: 900,
            usage_days: 7,
            memory_lookback_secs: 86_400,
            memory_limit: 100,
            source_timeout_ms: 5_000,
        }
    }
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite state database (":memory:" for ephemeral runs).
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("warden.db"),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

/// Model provider credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Anthropic API key. Falls back to ANTHROPIC_API_KEY.
    pub anthropic_api_key: Option<String>,
    /// OpenAI API key. Falls back to OPENAI_API_KEY.
    pub openai_api_key: Option<String>,
    /// Base URL for an OpenAI-compatible endpoint (vLLM, Azure, …).
    pub openai_base_url: Option<String>,
}

impl ServicesConfig {
    /// Whether any model-provider credential is configured.
    pub fn has_ai_provider_key(&self) -> bool {
        self.anthropic_api_key.as_deref().is_some_and(|k| !k.is_empty())
            || self.openai_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl WardenConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent model ───
        let model = &self.agent.model;
        if model.is_empty() {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'anthropic/claude-sonnet-4-20250514' or 'openai/gpt-4o'".into()),
            });
        } else if !model.contains('/') {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: format!("model '{}' should be in 'provider/model' format", model),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "agent.temperature".into(),
                message: format!("temperature {} is out of range", self.agent.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }

        if self.agent.request_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "agent.request_timeout_secs".into(),
                message: "model calls must have a hard timeout".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 20".into()),
            });
        }

        // ── Autonomy level ───
        if self.autonomy.level > 5 {
            warnings.push(ConfigWarning {
                field: "autonomy.level".into(),
                message: format!("level {} is invalid", self.autonomy.level),
                severity: WarningSeverity::Error,
                hint: Some("Valid levels: 0 (A0 manual) through 5 (A5 maximal autonomy)".into()),
            });
        } else if self.autonomy.level == 5 {
            warnings.push(ConfigWarning {
                field: "autonomy.level".into(),
                message: "level 5: only critical-risk goals need approval".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Consider A3 or A4 for production clusters".into()),
            });
        }

        for (field, value) in [
            ("autonomy.min_confidence_write", self.autonomy.min_confidence_write),
            ("autonomy.min_confidence_dry_run", self.autonomy.min_confidence_dry_run),
            ("goal_manager.min_candidate_confidence", self.goal_manager.min_candidate_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("{} is outside 0.0-1.0", value),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }

        if self.autonomy.min_confidence_write < self.autonomy.min_confidence_dry_run {
            warnings.push(ConfigWarning {
                field: "autonomy.min_confidence_write".into(),
                message: "write threshold is lower than the dry-run threshold".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Goal manager ───
        let gm = &self.goal_manager;
        if gm.dispatch_enabled && gm.allow_writes && !gm.dry_run {
            warnings.push(ConfigWarning {
                field: "goal_manager.allow_writes".into(),
                message: "dispatch will execute infrastructure writes".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Keep dry_run = true until the queue has been reviewed".into()),
            });
        }
        if gm.tick_interval_secs == 0 || gm.dispatch_interval_secs == 0 {
            warnings.push(ConfigWarning {
                field: "goal_manager.tick_interval_secs".into(),
                message: "driver intervals must be non-zero".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if gm.max_replan_attempts > 5 {
            warnings.push(ConfigWarning {
                field: "goal_manager.max_replan_attempts".into(),
                message: format!("{} re-plans per goal is unusually high", gm.max_replan_attempts),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if gm.stale_running_secs < 60 {
            warnings.push(ConfigWarning {
                field: "goal_manager.stale_running_secs".into(),
                message: "running goals will be superseded almost immediately".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Use a bound longer than the slowest plan".into()),
            });
        }
        if gm.llm_enhancement_enabled && !self.services.has_ai_provider_key() {
            warnings.push(ConfigWarning {
                field: "services".into(),
                message: "no model provider key; candidate and plan generation will use rules only".into(),
                severity: WarningSeverity::Info,
                hint: Some("Set ANTHROPIC_API_KEY or OPENAI_API_KEY".into()),
            });
        }

        // ── Signals ───
        if self.signals.source_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                field: "signals.source_timeout_ms".into(),
                message: "signal sources must be time-boxed".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 5000".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
