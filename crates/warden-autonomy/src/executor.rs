//! Policy-gated plan execution with post-condition verification and rollback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use warden_core::ops::*;
use warden_core::{Event, EventBus, Initiator, Result, WardenError, memory_gib_for_vcpu};

use crate::plan::*;
use crate::policy::PolicySettings;
use crate::rollback::{RollbackResult, build_rollback_plan, run_rollback};
use crate::verify::{
    OperationRecord, OperationVerificationResult, verify_operation_outcome,
};

/// The write-side collaborators steps are delegated to.
#[derive(Clone)]
pub struct OpsCollaborators {
    pub scaler: Arc<dyn Scaler>,
    pub actions: Arc<dyn ActionExecutor>,
    pub rpc: Arc<dyn RpcEndpointOperator>,
}

impl OpsCollaborators {
    pub fn from_shared<E>(env: Arc<E>) -> Self
    where
        E: Scaler + ActionExecutor + RpcEndpointOperator + 'static,
    {
        Self {
            scaler: env.clone(),
            actions: env.clone(),
            rpc: env,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutePlanOptions {
    pub dry_run: bool,
    pub allow_writes: bool,
    pub initiated_by: Initiator,
    /// Human approval already granted for this run.
    #[serde(default)]
    pub approved: bool,
    /// Confidence of the goal being executed, when there is one.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Default for ExecutePlanOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            allow_writes: false,
            initiated_by: Initiator::Operator,
            approved: false,
            confidence: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub step_id: String,
    pub action: PlanAction,
    pub status: StepStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<OperationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<OperationVerificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackResult>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecutionResult {
    /// The plan with final step and plan statuses.
    pub plan: GoalPlan,
    pub log: Vec<ExecutionLogEntry>,
    /// Message of the step that stopped the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl PlanExecutionResult {
    pub fn is_completed(&self) -> bool {
        self.plan.status == PlanStatus::Completed
    }

    /// The message of the step that stopped the plan, or the planning failure.
    pub fn failure_message(&self) -> Option<String> {
        self.abort_reason
            .clone()
            .or_else(|| {
                self.log
                    .iter()
                    .find(|e| e.status == StepStatus::Failed)
                    .map(|e| e.message.clone())
            })
            .or_else(|| {
                self.plan
                    .failure
                    .as_ref()
                    .map(|f| format!("{}: {}", f.code, f.message))
            })
            .or_else(|| {
                (self.plan.status == PlanStatus::Failed).then(|| "plan execution failed".into())
            })
    }
}

/// How one step ended, before it is written into the plan and the log.
struct StepOutcome {
    status: StepStatus,
    message: String,
    record: Option<OperationRecord>,
    verification: Option<OperationVerificationResult>,
    rollback: Option<RollbackResult>,
    /// Stop the plan after this step.
    abort: bool,
}

impl StepOutcome {
    fn completed(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Completed,
            message: message.into(),
            record: None,
            verification: None,
            rollback: None,
            abort: false,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            message: message.into(),
            abort: true,
            ..Self::completed("")
        }
    }

    fn skipped(message: impl Into<String>, abort: bool) -> Self {
        Self {
            status: StepStatus::Skipped,
            message: message.into(),
            abort,
            ..Self::completed("")
        }
    }
}

pub struct PlanExecutor {
    ops: OpsCollaborators,
    policy: PolicySettings,
    events: Option<EventBus>,
}

impl PlanExecutor {
    pub fn new(ops: OpsCollaborators, policy: PolicySettings) -> Self {
        Self {
            ops,
            policy,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> &PolicySettings {
        &self.policy
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Execute every step in order. Never returns an error: failures end up in
    /// the returned plan status and log.
    pub async fn execute_goal_plan(
        &self,
        plan: &GoalPlan,
        options: &ExecutePlanOptions,
    ) -> PlanExecutionResult {
        let mut plan = plan.clone();
        let mut log = Vec::new();

        if !plan.is_executable() {
            warn!(plan_id = %plan.plan_id, "plan is not executable");
            plan.status = PlanStatus::Failed;
            return PlanExecutionResult {
                plan,
                log,
                abort_reason: None,
            };
        }

        info!(
            plan_id = %plan.plan_id,
            steps = plan.steps.len(),
            dry_run = options.dry_run,
            allow_writes = options.allow_writes,
            initiated_by = options.initiated_by.as_str(),
            "executing goal plan"
        );

        let mut aborted: Option<String> = None;
        let mut failed = false;
        let plan_id = plan.plan_id.clone();

        for step in plan.steps.iter_mut() {
            let outcome = match &aborted {
                Some(reason) => StepOutcome::skipped(format!("skipped: {reason}"), true),
                None => {
                    set_status(step, StepStatus::Running);
                    self.run_step(&plan_id, step, options).await
                }
            };

            set_status(step, outcome.status);
            if outcome.status == StepStatus::Failed {
                failed = true;
            }
            if outcome.abort && aborted.is_none() {
                aborted = Some(outcome.message.clone());
                failed = true;
            }

            log.push(ExecutionLogEntry {
                step_id: step.id.clone(),
                action: step.action,
                status: outcome.status,
                message: outcome.message,
                record: outcome.record,
                verification: outcome.verification,
                rollback: outcome.rollback,
                timestamp: Utc::now(),
            });
        }

        plan.status = if failed {
            PlanStatus::Failed
        } else {
            PlanStatus::Completed
        };
        info!(plan_id = %plan.plan_id, status = plan.status.as_str(), "goal plan finished");
        PlanExecutionResult {
            plan,
            log,
            abort_reason: aborted,
        }
    }

    async fn run_step(
        &self,
        plan_id: &str,
        step: &GoalPlanStep,
        options: &ExecutePlanOptions,
    ) -> StepOutcome {
        if !step.action.is_write() {
            return match self.run_read(step).await {
                Ok(output) => StepOutcome::completed(output),
                Err(e) => StepOutcome::failed(format!("{}: {e}", step.action)),
            };
        }

        if !options.allow_writes {
            return StepOutcome::skipped(format!("{}: writes not allowed", step.action), false);
        }
        if options.dry_run {
            return StepOutcome {
                verification: Some(OperationVerificationResult::dry_run()),
                ..StepOutcome::completed(format!("{}: dry run, no changes made", step.action))
            };
        }

        let decision = self.policy.evaluate(
            options.initiated_by,
            options.allow_writes,
            options.dry_run,
            step.risk,
            options.confidence,
        );
        if decision.is_denied() || (decision.requires_approval() && !options.approved) {
            warn!(
                step = %step.action,
                decision = %decision.decision,
                reason_code = %decision.reason_code,
                "write step blocked by policy"
            );
            return StepOutcome::skipped(
                format!("{}: {} ({})", step.action, decision.message, decision.reason_code),
                true,
            );
        }

        let record = match self.run_write(step).await {
            Ok(record) => record,
            Err(e) => {
                error!(step = %step.action, error = %e, "write step failed");
                return StepOutcome::failed(format!("{}: {e}", step.action));
            }
        };

        let verification = verify_operation_outcome(&record, false, self.ops.rpc.as_ref()).await;
        self.publish(Event::StepVerified {
            plan_id: plan_id.to_string(),
            step_id: step.id.clone(),
            passed: verification.passed,
        });
        if verification.passed {
            return StepOutcome {
                record: Some(record),
                verification: Some(verification),
                ..StepOutcome::completed(format!("{}: verified", step.action))
            };
        }

        warn!(
            step = %step.action,
            expected = %verification.expected,
            observed = %verification.observed,
            "verification failed, rolling back"
        );
        let rollback_plan = build_rollback_plan(&record);
        let rollback = run_rollback(&rollback_plan, &self.ops).await;
        if rollback.attempted {
            self.publish(Event::RollbackExecuted {
                plan_id: plan_id.to_string(),
                step_id: step.id.clone(),
                success: rollback.success,
            });
        }
        StepOutcome {
            record: Some(record),
            rollback: Some(rollback.clone()),
            message: format!(
                "{}: verification failed (expected {}, observed {}); {}",
                step.action, verification.expected, verification.observed, rollback.message
            ),
            verification: Some(verification),
            ..StepOutcome::failed("")
        }
    }

    async fn run_read(&self, step: &GoalPlanStep) -> Result<String> {
        let action = OpsAction::new(step.action.as_str(), step.parameters.clone());
        let outcome = self.ops.actions.execute(&action).await?;
        match outcome.status {
            ActionStatus::Success => Ok(outcome.output.unwrap_or_else(|| "ok".into())),
            ActionStatus::Failed => Err(WardenError::Execution {
                action: step.action.as_str().to_string(),
                reason: outcome.error.unwrap_or_else(|| "action failed".into()),
            }),
        }
    }

    async fn run_write(&self, step: &GoalPlanStep) -> Result<OperationRecord> {
        match step.action {
            PlanAction::ScaleExecution => {
                let target = step.param_u32("targetVcpu").ok_or_else(|| WardenError::Execution {
                    action: step.action.as_str().to_string(),
                    reason: "missing targetVcpu".into(),
                })?;
                let outcome = self
                    .ops
                    .scaler
                    .scale(target, memory_gib_for_vcpu(target), false)
                    .await?;
                Ok(OperationRecord::Scale {
                    target_vcpu: target,
                    previous_vcpu: outcome.previous_vcpu,
                    observed_vcpu: outcome.current_vcpu,
                })
            }
            PlanAction::RestartExecution => {
                let restart = OpsAction::new("restart_execution", step.parameters.clone());
                let outcome = self.ops.actions.execute(&restart).await?;
                if outcome.status == ActionStatus::Failed {
                    return Err(WardenError::Execution {
                        action: restart.kind,
                        reason: outcome.error.unwrap_or_else(|| "restart failed".into()),
                    });
                }
                let probe = OpsAction::new("health_check", serde_json::Value::Null);
                let health = self.ops.actions.execute(&probe).await?;
                Ok(OperationRecord::Restart {
                    health_output: health.output.or(health.error),
                })
            }
            PlanAction::SetRoutingPolicy => {
                let policy = step.param_str("policyName").unwrap_or("failover_priority");
                if let (Some(name), Some(url)) =
                    (step.param_str("backendName"), step.param_str("backendUrl"))
                {
                    let update = self.ops.rpc.update_backend(name, url).await?;
                    info!(policy, backend = name, url, "backend updated");
                    return Ok(OperationRecord::BackendUpdate {
                        name: update.name,
                        requested_url: url.to_string(),
                        previous_url: update.previous_url,
                        current_url: update.current_url,
                    });
                }
                let requested = step.param_str("targetUrl");
                let switch = self.ops.rpc.switch_endpoint(requested).await?;
                info!(policy, active = %switch.active_url, "rpc endpoint switched");
                Ok(OperationRecord::EndpointSwitch {
                    requested_url: requested.map(str::to_string),
                    previous_url: switch.previous_url,
                    active_url: switch.active_url,
                })
            }
            read => Err(WardenError::Execution {
                action: read.as_str().to_string(),
                reason: "not a write action".into(),
            }),
        }
    }
}

fn set_status(step: &mut GoalPlanStep, next: StepStatus) {
    if step.status == next {
        return;
    }
    if step.status.can_transition_to(next) {
        step.status = next;
    } else {
        warn!(
            step_id = %step.id,
            from = step.status.as_str(),
            to = next.as_str(),
            "ignoring invalid step transition"
        );
    }
}
