//! Contracts for the external collaborators the control plane consumes.
//!
//! Everything behind these traits (the metrics store, the anomaly detector,
//! the scaler, the RPC failover manager, …) lives outside this workspace.
//! Implementations must be cheap to share behind an `Arc`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::types::RiskLevel;

// ── Read-side sources ──────────────────────────────────────────

/// One sample from the metrics time-series store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub tx_pool_pending: f64,
    pub gas_used_ratio: f64,
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// The most recent `n` samples, in any order.
    async fn get_recent_metrics(&self, n: usize) -> Result<Vec<MetricSample>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyEventStatus {
    Active,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyScore {
    #[serde(default)]
    pub metric: String,
    pub z_score: f64,
}

/// AI deep-analysis enrichment attached to an anomaly event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepAnalysis {
    pub severity: RiskLevel,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub status: AnomalyEventStatus,
    #[serde(default)]
    pub anomalies: Vec<AnomalyScore>,
    #[serde(default)]
    pub deep_analysis: Option<DeepAnalysis>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyEventPage {
    pub events: Vec<AnomalyEvent>,
    pub total: usize,
    pub active_count: usize,
}

#[async_trait]
pub trait AnomalySource: Send + Sync {
    async fn get_events(&self, limit: usize, offset: usize) -> Result<AnomalyEventPage>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub from_url: Option<String>,
    #[serde(default)]
    pub to_url: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[async_trait]
pub trait FailoverSource: Send + Sync {
    async fn get_failover_events(&self) -> Result<Vec<FailoverEvent>>;
    async fn get_active_endpoint(&self) -> Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub avg_vcpu: f64,
    pub peak_vcpu: f64,
    pub avg_utilization: f64,
    pub data_point_count: usize,
}

#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn get_usage_summary(&self, days: u32) -> Result<UsageSummary>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub from_ts: DateTime<Utc>,
    pub limit: usize,
}

/// An entry in the long-term incident memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub severity: RiskLevel,
    pub summary: String,
}

#[async_trait]
pub trait MemorySource: Send + Sync {
    async fn query_memory(&self, query: &MemoryQuery) -> Result<Vec<MemoryEntry>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingState {
    pub current_vcpu: u32,
    pub cooldown_remaining_secs: u64,
    pub auto_scaling_enabled: bool,
}

#[async_trait]
pub trait ScalingStateSource: Send + Sync {
    async fn get_scaling_state(&self) -> Result<ScalingState>;
}

// ── Write-side collaborators ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleOutcome {
    pub previous_vcpu: u32,
    pub current_vcpu: u32,
    pub dry_run: bool,
    pub message: String,
}

/// The infrastructure scaler for the execution tier.
#[async_trait]
pub trait Scaler: Send + Sync {
    async fn scale(&self, target_vcpu: u32, target_memory_gib: u32, dry_run: bool)
        -> Result<ScaleOutcome>;
}

/// A generic operational action (`restart_execution`, `health_check`, `run_rca`, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsAction {
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

impl OpsAction {
    pub fn new(kind: &str, params: Value) -> Self {
        Self {
            kind: kind.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub status: ActionStatus,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Success,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            output: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &OpsAction) -> Result<ActionOutcome>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSwitch {
    pub previous_url: Option<String>,
    pub active_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendUpdate {
    pub name: String,
    pub previous_url: Option<String>,
    pub current_url: String,
}

/// The RPC endpoint failover manager.
#[async_trait]
pub trait RpcEndpointOperator: Send + Sync {
    /// Switch to `target_url`, or to any healthy alternative when `None`.
    async fn switch_endpoint(&self, target_url: Option<&str>) -> Result<EndpointSwitch>;
    async fn update_backend(&self, name: &str, url: &str) -> Result<BackendUpdate>;
    /// Live health probe of a single endpoint.
    async fn probe_endpoint(&self, url: &str) -> Result<bool>;
}
