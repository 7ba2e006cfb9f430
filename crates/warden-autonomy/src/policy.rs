//! Stateless execution policy shared by goal dispatch, plan execution and
//! tool-call gating.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use warden_config::AutonomyConfig;
use warden_core::{Initiator, RiskLevel};

use crate::level::AutonomyLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecisionKind {
    Allow,
    Deny,
    RequireApproval,
}

impl PolicyDecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::RequireApproval => "require_approval",
        }
    }
}

impl fmt::Display for PolicyDecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`evaluate_goal_execution_policy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: PolicyDecisionKind,
    /// Stable machine-readable code.
    pub reason_code: String,
    pub message: String,
}

impl PolicyDecision {
    fn allow() -> Self {
        Self {
            decision: PolicyDecisionKind::Allow,
            reason_code: "allowed".into(),
            message: "execution allowed by policy".into(),
        }
    }

    fn deny(reason_code: &str, message: String) -> Self {
        Self {
            decision: PolicyDecisionKind::Deny,
            reason_code: reason_code.into(),
            message,
        }
    }

    fn require_approval(reason_code: &str, message: String) -> Self {
        Self {
            decision: PolicyDecisionKind::RequireApproval,
            reason_code: reason_code.into(),
            message,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == PolicyDecisionKind::Allow
    }

    pub fn is_denied(&self) -> bool {
        self.decision == PolicyDecisionKind::Deny
    }

    pub fn requires_approval(&self) -> bool {
        self.decision == PolicyDecisionKind::RequireApproval
    }
}

/// Everything the policy looks at. Build one with [`PolicySettings::input`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyInput {
    pub level: AutonomyLevel,
    pub read_only_mode: bool,
    pub min_confidence_write: f64,
    pub min_confidence_dry_run: f64,
    /// Scheduler-driven execution.
    pub auto_execute: bool,
    pub allow_writes: bool,
    pub dry_run: bool,
    pub risk: RiskLevel,
    /// Candidate confidence; `None` skips the threshold check.
    pub confidence: Option<f64>,
}

impl PolicyInput {
    /// Writes that actually reach infrastructure.
    pub fn is_write_run(&self) -> bool {
        self.allow_writes && !self.dry_run
    }
}

/// Evaluate whether a goal or step may run. First matching rule wins.
pub fn evaluate_goal_execution_policy(input: &PolicyInput) -> PolicyDecision {
    let decision = decide(input);
    debug!(
        level = %input.level,
        risk = %input.risk,
        auto = input.auto_execute,
        allow_writes = input.allow_writes,
        dry_run = input.dry_run,
        decision = %decision.decision,
        reason_code = %decision.reason_code,
        "policy evaluated"
    );
    decision
}

fn decide(input: &PolicyInput) -> PolicyDecision {
    let level = input.level;

    if input.auto_execute && input.allow_writes && input.read_only_mode {
        return PolicyDecision::deny(
            "read_only_mode",
            "automatic write execution is blocked while read-only mode is on".into(),
        );
    }
    if level.is_manual() && input.auto_execute {
        return PolicyDecision::deny(
            "autonomy_level_manual",
            format!("autonomy level {level} does not allow automatic execution"),
        );
    }
    if level == AutonomyLevel::A2 && input.allow_writes {
        return PolicyDecision::deny(
            "autonomy_level_dry_run_only",
            format!("autonomy level {level} only allows dry-run execution"),
        );
    }
    if let Some(confidence) = input.confidence {
        let (threshold, kind) = if input.is_write_run() {
            (input.min_confidence_write, "write")
        } else {
            (input.min_confidence_dry_run, "dry-run")
        };
        if confidence < threshold {
            return PolicyDecision::deny(
                "low_confidence",
                format!("confidence {confidence:.2} is below the {kind} threshold {threshold:.2}"),
            );
        }
    }

    let risk = input.risk;
    let needs_approval = match level {
        AutonomyLevel::A0 | AutonomyLevel::A1 => input.allow_writes,
        AutonomyLevel::A2 => false,
        AutonomyLevel::A3 => risk >= RiskLevel::Medium,
        AutonomyLevel::A4 => risk >= RiskLevel::High,
        AutonomyLevel::A5 => risk >= RiskLevel::Critical,
    };
    if needs_approval {
        let message = if level.is_manual() {
            format!("operator writes at autonomy level {level} need human approval")
        } else {
            format!("{risk} risk at autonomy level {level} needs human approval")
        };
        return PolicyDecision::require_approval("approval_required", message);
    }

    PolicyDecision::allow()
}

/// The configured half of a [`PolicyInput`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySettings {
    pub level: AutonomyLevel,
    pub read_only_mode: bool,
    pub min_confidence_write: f64,
    pub min_confidence_dry_run: f64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self::from(&AutonomyConfig::default())
    }
}

impl From<&AutonomyConfig> for PolicySettings {
    fn from(config: &AutonomyConfig) -> Self {
        Self {
            level: AutonomyLevel::from_u8(config.level),
            read_only_mode: config.read_only_mode,
            min_confidence_write: config.min_confidence_write,
            min_confidence_dry_run: config.min_confidence_dry_run,
        }
    }
}

impl PolicySettings {
    pub fn input(
        &self,
        initiated_by: Initiator,
        allow_writes: bool,
        dry_run: bool,
        risk: RiskLevel,
        confidence: Option<f64>,
    ) -> PolicyInput {
        PolicyInput {
            level: self.level,
            read_only_mode: self.read_only_mode,
            min_confidence_write: self.min_confidence_write,
            min_confidence_dry_run: self.min_confidence_dry_run,
            auto_execute: initiated_by.is_automatic(),
            allow_writes,
            dry_run,
            risk,
            confidence,
        }
    }
}

impl PolicySettings {
    pub fn evaluate(
        &self,
        initiated_by: Initiator,
        allow_writes: bool,
        dry_run: bool,
        risk: RiskLevel,
        confidence: Option<f64>,
    ) -> PolicyDecision {
        evaluate_goal_execution_policy(&self.input(
            initiated_by,
            allow_writes,
            dry_run,
            risk,
            confidence,
        ))
    }
}
