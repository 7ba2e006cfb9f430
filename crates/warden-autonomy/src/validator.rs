//! The single validator every proposed plan passes through, whether it came
//! from a model or from a rule template.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use warden_core::{RiskLevel, VCPU_TIERS};
use warden_signals::GoalPlannerRuntimeContext;

use crate::plan::*;

/// A proposed plan as received: loosely typed, nothing trusted yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoalPlanCandidate {
    pub intent: Option<String>,
    pub summary: Option<String>,
    pub steps: Vec<CandidateStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateStep {
    pub title: Option<String>,
    pub action: String,
    pub reason: Option<String>,
    pub risk: Option<String>,
    pub requires_approval: Option<bool>,
    pub parameters: Value,
    pub preconditions: Vec<String>,
    pub rollback_hint: Option<String>,
}

impl CandidateStep {
    pub fn new(action: PlanAction, reason: &str, parameters: Value) -> Self {
        Self {
            title: Some(action.default_title().to_string()),
            action: action.as_str().to_string(),
            reason: Some(reason.to_string()),
            parameters,
            ..Default::default()
        }
    }
}

/// Run conditions the validator checks a candidate against.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub dry_run: bool,
    pub allow_writes: bool,
    pub read_only_mode: bool,
    pub runtime: GoalPlannerRuntimeContext,
}

#[derive(Debug, Clone)]
pub enum PlanValidation {
    /// Normalized, executable steps.
    Valid { steps: Vec<GoalPlanStep> },
    /// Every issue found; `reason_code` is the first one's code.
    Invalid {
        reason_code: ValidationCode,
        issues: Vec<ValidationIssue>,
    },
}

impl PlanValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Valid { .. } => &[],
            Self::Invalid { issues, .. } => issues,
        }
    }
}

struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, code: ValidationCode, step_index: Option<usize>, message: String) {
        self.0.push(ValidationIssue {
            code,
            step_index,
            message,
        });
    }
}

pub fn validate_goal_plan_candidate(
    candidate: &GoalPlanCandidate,
    ctx: &ValidationContext,
) -> PlanValidation {
    let mut issues = Issues(Vec::new());

    if !ctx.dry_run && !ctx.allow_writes {
        issues.push(
            ValidationCode::PolicyViolation,
            None,
            "non-dry-run execution requires allow_writes".into(),
        );
    }
    let count = candidate.steps.len();
    if count == 0 || count > MAX_PLAN_STEPS {
        issues.push(
            ValidationCode::SchemaInvalid,
            None,
            format!("plan must have 1-{MAX_PLAN_STEPS} steps, got {count}"),
        );
    }

    let steps: Vec<GoalPlanStep> = candidate
        .steps
        .iter()
        .enumerate()
        .filter_map(|(i, step)| validate_step(i, step, ctx, &mut issues))
        .collect();

    match issues.0.first() {
        None => PlanValidation::Valid { steps },
        Some(first) => {
            let reason_code = first.code;
            debug!(
                reason_code = %reason_code,
                issues = issues.0.len(),
                "plan candidate rejected"
            );
            PlanValidation::Invalid {
                reason_code,
                issues: issues.0,
            }
        }
    }
}

fn validate_step(
    index: usize,
    step: &CandidateStep,
    ctx: &ValidationContext,
    issues: &mut Issues,
) -> Option<GoalPlanStep> {
    let at = Some(index);
    let Some(action) = PlanAction::parse(&step.action) else {
        issues.push(
            ValidationCode::InvalidStepAction,
            at,
            format!("unknown action '{}'", step.action),
        );
        return None;
    };

    let parameters = match &step.parameters {
        Value::Null => Value::Object(Map::new()),
        Value::Object(_) => step.parameters.clone(),
        _ => {
            issues.push(
                ValidationCode::SchemaInvalid,
                at,
                format!("{action}: parameters must be an object"),
            );
            return None;
        }
    };

    let proposed_risk = step.risk.as_deref().and_then(RiskLevel::parse);
    let risk = proposed_risk
        .unwrap_or(action.default_risk())
        .max(action.default_risk());

    if action.is_write() && ctx.read_only_mode && ctx.allow_writes {
        issues.push(
            ValidationCode::PolicyViolation,
            at,
            format!("{action} is a write action and read-only mode is on"),
        );
    }

    match action {
        PlanAction::ScaleExecution => check_scale(&parameters, ctx, at, issues),
        PlanAction::SetRoutingPolicy => check_routing(&parameters, at, issues),
        _ => {}
    }

    fn text(v: &Option<String>) -> Option<&str> {
        v.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
    Some(GoalPlanStep {
        id: Uuid::new_v4().to_string(),
        title: text(&step.title)
            .unwrap_or(action.default_title())
            .to_string(),
        action,
        reason: text(&step.reason).unwrap_or_default().to_string(),
        risk,
        requires_approval: action.is_write() || step.requires_approval.unwrap_or(false),
        parameters,
        preconditions: step.preconditions.clone(),
        rollback_hint: text(&step.rollback_hint).map(str::to_string),
        status: StepStatus::Pending,
    })
}

fn check_scale(
    parameters: &Value,
    ctx: &ValidationContext,
    at: Option<usize>,
    issues: &mut Issues,
) {
    let target = parameters
        .get("targetVcpu")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| VCPU_TIERS.contains(v));
    let Some(target) = target else {
        issues.push(
            ValidationCode::SchemaInvalid,
            at,
            format!(
                "scale_execution needs targetVcpu in {VCPU_TIERS:?}, got {}",
                parameters.get("targetVcpu").unwrap_or(&Value::Null)
            ),
        );
        return;
    };

    let runtime = &ctx.runtime;
    if runtime.cooldown_remaining_secs > 0 && target != runtime.current_vcpu {
        issues.push(
            ValidationCode::RuntimePreconditionFailed,
            at,
            format!(
                "scaler cooldown active ({}s remaining), cannot move {} -> {} vCPU",
                runtime.cooldown_remaining_secs, runtime.current_vcpu, target
            ),
        );
    }
    if target < runtime.current_vcpu && runtime.active_anomaly_count > 0 {
        issues.push(
            ValidationCode::RuntimePreconditionFailed,
            at,
            format!(
                "downscale {} -> {} vCPU refused with {} active anomalies",
                runtime.current_vcpu, target, runtime.active_anomaly_count
            ),
        );
    }
}

fn check_routing(parameters: &Value, at: Option<usize>, issues: &mut Issues) {
    let name = parameters.get("policyName").and_then(Value::as_str);
    if !name.is_some_and(|n| ROUTING_POLICIES.contains(&n)) {
        issues.push(
            ValidationCode::SchemaInvalid,
            at,
            format!(
                "set_routing_policy needs policyName in {ROUTING_POLICIES:?}, got {}",
                name.unwrap_or("nothing")
            ),
        );
    }
}
