use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use warden_core::{GoalIntent, RiskLevel};

/// The six step actions a plan may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    CollectState,
    InspectAnomalies,
    RunRca,
    ScaleExecution,
    RestartExecution,
    SetRoutingPolicy,
}

impl PlanAction {
    pub const ALL: [PlanAction; 6] = [
        Self::CollectState,
        Self::InspectAnomalies,
        Self::RunRca,
        Self::ScaleExecution,
        Self::RestartExecution,
        Self::SetRoutingPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectState => "collect_state",
            Self::InspectAnomalies => "inspect_anomalies",
            Self::RunRca => "run_rca",
            Self::ScaleExecution => "scale_execution",
            Self::RestartExecution => "restart_execution",
            Self::SetRoutingPolicy => "set_routing_policy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    /// Actions that mutate infrastructure.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::ScaleExecution | Self::RestartExecution | Self::SetRoutingPolicy
        )
    }

    /// Floor risk for the action; proposals below it are raised.
    pub fn default_risk(&self) -> RiskLevel {
        match self {
            Self::CollectState | Self::InspectAnomalies | Self::RunRca => RiskLevel::Low,
            Self::ScaleExecution | Self::SetRoutingPolicy => RiskLevel::Medium,
            Self::RestartExecution => RiskLevel::High,
        }
    }

    pub fn default_title(&self) -> &'static str {
        match self {
            Self::CollectState => "Collect current operational state",
            Self::InspectAnomalies => "Inspect active anomalies",
            Self::RunRca => "Run root-cause analysis",
            Self::ScaleExecution => "Scale the execution tier",
            Self::RestartExecution => "Restart the execution client",
            Self::SetRoutingPolicy => "Change RPC routing policy",
        }
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing policy names accepted by `set_routing_policy`.
pub const ROUTING_POLICIES: [&str; 4] = [
    "primary_only",
    "round_robin",
    "latency_weighted",
    "failover_priority",
];

/// Maximum number of steps a plan may carry.
pub const MAX_PLAN_STEPS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// pending → running → completed | failed | skipped; pending → skipped.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Skipped)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Planned,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Where an accepted plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Llm,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPlanStep {
    pub id: String,
    pub title: String,
    pub action: PlanAction,
    pub reason: String,
    pub risk: RiskLevel,
    pub requires_approval: bool,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_hint: Option<String>,
    pub status: StepStatus,
}

impl GoalPlanStep {
    /// Typed read of an integer parameter.
    pub fn param_u32(&self, key: &str) -> Option<u32> {
        self.parameters
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// The reason code and message of a plan that never became executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFailure {
    pub code: String,
    pub message: String,
}

/// A validator finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    /// Zero-based step index; `None` for plan-level issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_index {
            Some(i) => write!(f, "[{}] step {}: {}", self.code, i + 1, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    SchemaInvalid,
    InvalidStepAction,
    PolicyViolation,
    RuntimePreconditionFailed,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaInvalid => "schema_invalid",
            Self::InvalidStepAction => "invalid_step_action",
            Self::PolicyViolation => "policy_violation",
            Self::RuntimePreconditionFailed => "runtime_precondition_failed",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, validated plan for one goal. Owns its steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPlan {
    pub plan_id: String,
    pub goal: String,
    pub intent: GoalIntent,
    pub summary: String,
    pub dry_run: bool,
    pub status: PlanStatus,
    pub steps: Vec<GoalPlanStep>,
    pub source: PlanSource,
    /// Planning attempts used, including the accepted one.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PlanFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
    pub created_at: DateTime<Utc>,
}

impl GoalPlan {
    pub fn is_executable(&self) -> bool {
        self.status == PlanStatus::Planned && !self.steps.is_empty()
    }

    pub fn write_steps(&self) -> impl Iterator<Item = &GoalPlanStep> {
        self.steps.iter().filter(|s| s.action.is_write())
    }

    /// Highest step risk, `Low` for an empty plan.
    pub fn max_risk(&self) -> RiskLevel {
        self.steps
            .iter()
            .map(|s| s.risk)
            .max()
            .unwrap_or(RiskLevel::Low)
    }
}
