use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_core::ops::RpcEndpointOperator;

/// What an executed write step observed, before and after. Input to
/// verification and to rollback construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationRecord {
    Scale {
        target_vcpu: u32,
        previous_vcpu: u32,
        observed_vcpu: u32,
    },
    Restart {
        /// Output of the post-restart health probe.
        health_output: Option<String>,
    },
    EndpointSwitch {
        requested_url: Option<String>,
        previous_url: Option<String>,
        active_url: String,
    },
    BackendUpdate {
        name: String,
        requested_url: String,
        previous_url: Option<String>,
        current_url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationVerificationResult {
    pub expected: String,
    pub observed: String,
    pub passed: bool,
    pub details: String,
    pub verified_at: DateTime<Utc>,
}

impl OperationVerificationResult {
    fn new(expected: String, observed: String, passed: bool, details: impl Into<String>) -> Self {
        Self {
            expected,
            observed,
            passed,
            details: details.into(),
            verified_at: Utc::now(),
        }
    }

    pub fn dry_run() -> Self {
        Self::new(
            "dry run".into(),
            "dry run".into(),
            true,
            "dry run: no collaborator touched",
        )
    }
}

/// A health probe passes when a positive word appears and no negative word
/// does. Matching is per word, so `unhealthy` and `broken` are not positives.
pub fn health_output_is_ok(output: &str) -> bool {
    let lower = output.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let positive = words.iter().any(|w| matches!(*w, "healthy" | "ready" | "ok"));
    let negative = words.iter().any(|w| {
        matches!(*w, "unhealthy" | "unready" | "not" | "down" | "broken" | "error") || w.starts_with("fail")
    });
    positive && !negative
}

/// Check observed post-state against expected post-state. Dry runs always pass.
pub async fn verify_operation_outcome(
    record: &OperationRecord,
    dry_run: bool,
    rpc: &dyn RpcEndpointOperator,
) -> OperationVerificationResult {
    if dry_run {
        return OperationVerificationResult::dry_run();
    }

    let result = match record {
        OperationRecord::Scale {
            target_vcpu,
            observed_vcpu,
            ..
        } => {
            let passed = observed_vcpu == target_vcpu;
            OperationVerificationResult::new(
                format!("{target_vcpu} vCPU"),
                format!("{observed_vcpu} vCPU"),
                passed,
                if passed {
                    "execution tier at requested size"
                } else {
                    "execution tier did not reach requested size"
                },
            )
        }
        OperationRecord::Restart { health_output } => {
            let observed = health_output.clone().unwrap_or_default();
            let passed = health_output_is_ok(&observed);
            OperationVerificationResult::new(
                "healthy".into(),
                observed,
                passed,
                if passed {
                    "post-restart health probe passed"
                } else {
                    "post-restart health probe did not report healthy"
                },
            )
        }
        OperationRecord::EndpointSwitch {
            requested_url,
            active_url,
            ..
        } => {
            let expected = requested_url.clone().unwrap_or_else(|| "any reachable endpoint".into());
            let matches = match requested_url {
                Some(url) => url == active_url,
                None => !active_url.is_empty(),
            };
            verify_endpoint(expected, active_url, matches, rpc).await
        }
        OperationRecord::BackendUpdate {
            requested_url,
            current_url,
            ..
        } => {
            verify_endpoint(
                requested_url.clone(),
                current_url,
                requested_url == current_url,
                rpc,
            )
            .await
        }
    };
    debug!(passed = result.passed, details = %result.details, "operation verified");
    result
}

async fn verify_endpoint(
    expected: String,
    observed: &str,
    matches: bool,
    rpc: &dyn RpcEndpointOperator,
) -> OperationVerificationResult {
    if !matches {
        return OperationVerificationResult::new(
            expected,
            observed.to_string(),
            false,
            "active endpoint differs from requested target",
        );
    }
    let (passed, details) = match rpc.probe_endpoint(observed).await {
        Ok(true) => (true, "endpoint active and healthy".to_string()),
        Ok(false) => (false, "endpoint active but failed its health probe".to_string()),
        Err(e) => (false, format!("endpoint health probe errored: {e}")),
    };
    OperationVerificationResult::new(expected, observed.to_string(), passed, details)
}
