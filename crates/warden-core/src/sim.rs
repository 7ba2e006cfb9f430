//! In-process simulated environment implementing every collaborator
//! contract in [`crate::ops`].
//!
//! Used by tests and by the CLI (`--world world.json`) so the control plane
//! can be exercised end to end without live infrastructure.
//!
//! # Example
//! ```
//! use warden_core::sim::{SimulatedEnvironment, WorldState};
//! let env = SimulatedEnvironment::new(WorldState::default());
//! env.fail_source("anomalies");
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::ops::*;
use crate::{Result, WardenError};

/// Everything the simulated collaborators report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldState {
    pub metrics: Vec<MetricSample>,
    pub anomaly_events: Vec<AnomalyEvent>,
    pub failover_events: Vec<FailoverEvent>,
    pub active_endpoint: String,
    pub endpoints: Vec<String>,
    pub unreachable_endpoints: Vec<String>,
    pub backends: BTreeMap<String, String>,
    pub usage: UsageSummary,
    pub memory: Vec<MemoryEntry>,
    pub scaling: ScalingState,
    /// Cooldown applied after a successful scale.
    pub scale_cooldown_secs: u64,
    /// When set, the scaler reports success but the tier stays here.
    pub stuck_vcpu: Option<u32>,
    /// Output returned by `health_check` actions.
    pub health_output: String,
    /// Action kinds that report `Failed`.
    pub failing_actions: Vec<String>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
            anomaly_events: Vec::new(),
            failover_events: Vec::new(),
            active_endpoint: "https://rpc-primary.internal".into(),
            endpoints: vec![
                "https://rpc-primary.internal".into(),
                "https://rpc-secondary.internal".into(),
            ],
            unreachable_endpoints: Vec::new(),
            backends: BTreeMap::new(),
            usage: UsageSummary::default(),
            memory: Vec::new(),
            scaling: ScalingState {
                current_vcpu: 2,
                cooldown_remaining_secs: 0,
                auto_scaling_enabled: true,
            },
            scale_cooldown_secs: 300,
            stuck_vcpu: None,
            health_output: "execution client healthy".into(),
            failing_actions: Vec::new(),
        }
    }
}

/// A shared, mutable simulated world.
#[derive(Clone, Default)]
pub struct SimulatedEnvironment {
    state: Arc<RwLock<WorldState>>,
    failing_sources: Arc<RwLock<HashSet<String>>>,
    /// Every scale request received, for assertions in tests.
    pub scale_calls: Arc<RwLock<Vec<(u32, bool)>>>,
}

impl SimulatedEnvironment {
    pub fn new(state: WorldState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            failing_sources: Arc::new(RwLock::new(HashSet::new())),
            scale_calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Load a world description from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let state: WorldState = serde_json::from_str(&raw)?;
        Ok(Self::new(state))
    }

    /// Make the named source (`metrics`, `anomalies`, `failover`, `cost`,
    /// `memory`, `policy`) return an error until [`Self::heal_source`].
    pub fn fail_source(&self, name: &str) {
        self.failing_sources.write().insert(name.to_string());
    }

    pub fn heal_source(&self, name: &str) {
        self.failing_sources.write().remove(name);
    }

    pub fn snapshot(&self) -> WorldState {
        self.state.read().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut WorldState)) {
        f(&mut self.state.write());
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.failing_sources.read().contains(name) {
            return Err(WardenError::SignalSource {
                name: name.to_string(),
                reason: "simulated outage".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsSource for SimulatedEnvironment {
    async fn get_recent_metrics(&self, n: usize) -> Result<Vec<MetricSample>> {
        self.check("metrics")?;
        let mut samples = self.state.read().metrics.clone();
        samples.sort_by_key(|s| s.timestamp);
        let skip = samples.len().saturating_sub(n);
        Ok(samples.into_iter().skip(skip).collect())
    }
}

#[async_trait]
impl AnomalySource for SimulatedEnvironment {
    async fn get_events(&self, limit: usize, offset: usize) -> Result<AnomalyEventPage> {
        self.check("anomalies")?;
        let state = self.state.read();
        let mut events = state.anomaly_events.clone();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let active_count = events
            .iter()
            .filter(|e| e.status == AnomalyEventStatus::Active)
            .count();
        let total = events.len();
        Ok(AnomalyEventPage {
            events: events.into_iter().skip(offset).take(limit).collect(),
            total,
            active_count,
        })
    }
}

#[async_trait]
impl FailoverSource for SimulatedEnvironment {
    async fn get_failover_events(&self) -> Result<Vec<FailoverEvent>> {
        self.check("failover")?;
        Ok(self.state.read().failover_events.clone())
    }

    async fn get_active_endpoint(&self) -> Result<String> {
        self.check("failover")?;
        Ok(self.state.read().active_endpoint.clone())
    }
}

#[async_trait]
impl UsageSource for SimulatedEnvironment {
    async fn get_usage_summary(&self, _days: u32) -> Result<UsageSummary> {
        self.check("cost")?;
        Ok(self.state.read().usage.clone())
    }
}

#[async_trait]
impl MemorySource for SimulatedEnvironment {
    async fn query_memory(&self, query: &MemoryQuery) -> Result<Vec<MemoryEntry>> {
        self.check("memory")?;
        let mut entries: Vec<MemoryEntry> = self
            .state
            .read()
            .memory
            .iter()
            .filter(|m| m.timestamp >= query.from_ts)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(query.limit);
        Ok(entries)
    }
}

#[async_trait]
impl ScalingStateSource for SimulatedEnvironment {
    async fn get_scaling_state(&self) -> Result<ScalingState> {
        self.check("policy")?;
        Ok(self.state.read().scaling.clone())
    }
}

#[async_trait]
impl Scaler for SimulatedEnvironment {
    async fn scale(
        &self,
        target_vcpu: u32,
        _target_memory_gib: u32,
        dry_run: bool,
    ) -> Result<ScaleOutcome> {
        self.check("scaler")?;
        self.scale_calls.write().push((target_vcpu, dry_run));
        let mut state = self.state.write();
        let previous = state.scaling.current_vcpu;
        if dry_run {
            return Ok(ScaleOutcome {
                previous_vcpu: previous,
                current_vcpu: previous,
                dry_run: true,
                message: format!("dry run: would scale {previous} -> {target_vcpu} vCPU"),
            });
        }
        let applied = state.stuck_vcpu.unwrap_or(target_vcpu);
        state.scaling.current_vcpu = applied;
        state.scaling.cooldown_remaining_secs = state.scale_cooldown_secs;
        Ok(ScaleOutcome {
            previous_vcpu: previous,
            current_vcpu: applied,
            dry_run: false,
            message: format!("scaled {previous} -> {applied} vCPU"),
        })
    }
}

#[async_trait]
impl ActionExecutor for SimulatedEnvironment {
    async fn execute(&self, action: &OpsAction) -> Result<ActionOutcome> {
        self.check("actions")?;
        let state = self.state.read();
        if state.failing_actions.iter().any(|a| a == &action.kind) {
            return Ok(ActionOutcome::failed(format!("{} failed", action.kind)));
        }
        let outcome = match action.kind.as_str() {
            "health_check" => ActionOutcome::success(state.health_output.clone()),
            "restart_execution" => ActionOutcome::success("restart issued"),
            "collect_state" => ActionOutcome::success(format!(
                "{} vCPU, cooldown {}s, endpoint {}",
                state.scaling.current_vcpu,
                state.scaling.cooldown_remaining_secs,
                state.active_endpoint
            )),
            "inspect_anomalies" => ActionOutcome::success(format!(
                "{} active anomaly events",
                state
                    .anomaly_events
                    .iter()
                    .filter(|e| e.status == AnomalyEventStatus::Active)
                    .count()
            )),
            "run_rca" => ActionOutcome::success(format!(
                "rca: {} anomaly events, {} failovers, {} memory entries reviewed",
                state.anomaly_events.len(),
                state.failover_events.len(),
                state.memory.len()
            )),
            other => ActionOutcome::failed(format!("unsupported action '{other}'")),
        };
        Ok(outcome)
    }
}

#[async_trait]
impl RpcEndpointOperator for SimulatedEnvironment {
    async fn switch_endpoint(&self, target_url: Option<&str>) -> Result<EndpointSwitch> {
        self.check("rpc")?;
        let mut state = self.state.write();
        let previous = state.active_endpoint.clone();
        let next = match target_url {
            Some(url) => url.to_string(),
            None => state
                .endpoints
                .iter()
                .find(|e| **e != previous && !state.unreachable_endpoints.contains(e))
                .cloned()
                .ok_or_else(|| WardenError::collaborator("rpc", "no alternative endpoint"))?,
        };
        state.active_endpoint = next.clone();
        Ok(EndpointSwitch {
            previous_url: Some(previous),
            active_url: next,
        })
    }

    async fn update_backend(&self, name: &str, url: &str) -> Result<BackendUpdate> {
        self.check("rpc")?;
        let mut state = self.state.write();
        let previous = state.backends.insert(name.to_string(), url.to_string());
        Ok(BackendUpdate {
            name: name.to_string(),
            previous_url: previous,
            current_url: url.to_string(),
        })
    }

    async fn probe_endpoint(&self, url: &str) -> Result<bool> {
        self.check("rpc")?;
        Ok(!self.state.read().unreachable_endpoints.iter().any(|u| u == url))
    }
}
