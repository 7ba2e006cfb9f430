use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use warden_core::{Result, memory_gib_for_vcpu};

use crate::executor::OpsCollaborators;
use crate::verify::{OperationRecord, OperationVerificationResult, verify_operation_outcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub reason: String,
}

impl RollbackPlan {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            action_type: None,
            params: None,
            reason: reason.into(),
        }
    }

    fn inverse(action_type: &str, params: Value, reason: String) -> Self {
        Self {
            available: true,
            action_type: Some(action_type.to_string()),
            params: Some(params),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub attempted: bool,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<OperationVerificationResult>,
}

/// Derive the inverse operation from what execution observed.
pub fn build_rollback_plan(record: &OperationRecord) -> RollbackPlan {
    match record {
        OperationRecord::Scale { previous_vcpu, .. } => RollbackPlan::inverse(
            "scale_execution",
            json!({ "targetVcpu": previous_vcpu }),
            format!("restore previous tier of {previous_vcpu} vCPU"),
        ),
        OperationRecord::Restart { .. } => {
            RollbackPlan::unavailable("a restart has no inverse operation")
        }
        OperationRecord::EndpointSwitch {
            previous_url: Some(previous),
            ..
        } => RollbackPlan::inverse(
            "switch_endpoint",
            json!({ "targetUrl": previous }),
            format!("restore previous endpoint {previous}"),
        ),
        OperationRecord::EndpointSwitch { .. } => {
            RollbackPlan::unavailable("previous endpoint unknown")
        }
        OperationRecord::BackendUpdate {
            name,
            previous_url: Some(previous),
            ..
        } => RollbackPlan::inverse(
            "update_backend",
            json!({ "name": name, "url": previous }),
            format!("restore backend {name} to {previous}"),
        ),
        OperationRecord::BackendUpdate { name, .. } => {
            RollbackPlan::unavailable(format!("backend {name} had no previous URL"))
        }
    }
}

/// Execute a rollback plan and verify it like any other operation.
pub async fn run_rollback(plan: &RollbackPlan, ops: &OpsCollaborators) -> RollbackResult {
    if !plan.available {
        warn!(reason = %plan.reason, "rollback unavailable");
        return RollbackResult {
            attempted: false,
            success: false,
            message: format!("rollback unavailable: {}", plan.reason),
            verification: None,
        };
    }

    let record = match apply_inverse(plan, ops).await {
        Ok(record) => record,
        Err(e) => {
            error!(error = %e, action = ?plan.action_type, "rollback execution failed");
            return RollbackResult {
                attempted: true,
                success: false,
                message: format!("rollback failed: {e}"),
                verification: None,
            };
        }
    };

    let verification = verify_operation_outcome(&record, false, ops.rpc.as_ref()).await;
    let success = verification.passed;
    if success {
        info!(reason = %plan.reason, "rollback verified");
    } else {
        error!(reason = %plan.reason, observed = %verification.observed, "rollback did not verify");
    }
    RollbackResult {
        attempted: true,
        success,
        message: if success {
            format!("rolled back: {}", plan.reason)
        } else {
            format!("rollback did not verify: {}", verification.details)
        },
        verification: Some(verification),
    }
}

async fn apply_inverse(plan: &RollbackPlan, ops: &OpsCollaborators) -> Result<OperationRecord> {
    let params = plan.params.clone().unwrap_or(Value::Null);
    let str_param = |key: &str| params.get(key).and_then(Value::as_str).map(str::to_string);
    let malformed = || warden_core::WardenError::Execution {
        action: plan.action_type.clone().unwrap_or_default(),
        reason: "malformed rollback plan".into(),
    };

    match plan.action_type.as_deref() {
        Some("scale_execution") => {
            let target = params
                .get("targetVcpu")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(malformed)?;
            let outcome = ops
                .scaler
                .scale(target, memory_gib_for_vcpu(target), false)
                .await?;
            Ok(OperationRecord::Scale {
                target_vcpu: target,
                previous_vcpu: outcome.previous_vcpu,
                observed_vcpu: outcome.current_vcpu,
            })
        }
        Some("switch_endpoint") => {
            let target = str_param("targetUrl").ok_or_else(malformed)?;
            let switch = ops.rpc.switch_endpoint(Some(&target)).await?;
            Ok(OperationRecord::EndpointSwitch {
                requested_url: Some(target),
                previous_url: switch.previous_url,
                active_url: switch.active_url,
            })
        }
        Some("update_backend") => {
            let name = str_param("name").ok_or_else(malformed)?;
            let url = str_param("url").ok_or_else(malformed)?;
            let update = ops.rpc.update_backend(&name, &url).await?;
            Ok(OperationRecord::BackendUpdate {
                name,
                requested_url: url,
                previous_url: update.previous_url,
                current_url: update.current_url,
            })
        }
        _ => Err(malformed()),
    }
}
