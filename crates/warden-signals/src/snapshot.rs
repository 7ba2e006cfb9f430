use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::trend::Trend;
use warden_core::{Result, SignalSource, round4, stable_id};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSignal {
    pub latest_cpu_usage: Option<f64>,
    pub latest_tx_pool_pending: Option<f64>,
    pub latest_gas_used_ratio: Option<f64>,
    /// Filled from the scaling-state source.
    pub current_vcpu: u32,
    pub cooldown_remaining_secs: u64,
    pub cpu_trend: Trend,
    pub tx_pool_trend: Trend,
    pub gas_trend: Trend,
    pub sample_count: usize,
}

impl MetricsSignal {
    pub fn rising_count(&self) -> usize {
        [self.cpu_trend, self.tx_pool_trend, self.gas_trend]
            .iter()
            .filter(|t| **t == Trend::Rising)
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub active_count: usize,
    pub critical_count: usize,
    /// Timestamp of the newest active event.
    pub latest_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailoverSignal {
    /// Failovers inside the lookback window.
    pub recent_count: usize,
    pub latest_event_at: Option<DateTime<Utc>>,
    pub active_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSignal {
    pub avg_vcpu: f64,
    pub peak_vcpu: f64,
    pub avg_utilization: f64,
    pub data_point_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySignal {
    pub recent_count: usize,
    pub incident_count: usize,
    pub high_severity_count: usize,
    pub latest_entry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySignal {
    pub read_only_mode: bool,
    pub auto_scaling_enabled: bool,
}

impl Default for PolicySignal {
    /// Conservative: assume writes are blocked and nothing scales by itself.
    fn default() -> Self {
        Self {
            read_only_mode: true,
            auto_scaling_enabled: false,
        }
    }
}

/// An immutable, content-addressed view of operational state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub snapshot_id: String,
    pub collected_at: DateTime<Utc>,
    pub chain_type: String,
    pub sources: Vec<SignalSource>,
    pub metrics: MetricsSignal,
    pub anomalies: AnomalySignal,
    pub failover: FailoverSignal,
    pub cost: CostSignal,
    pub memory: MemorySignal,
    pub policy: PolicySignal,
    pub degraded_sources: Vec<SignalSource>,
}

impl SignalSnapshot {
    /// Content hash over every field except `snapshot_id`, floats rounded to 4 decimals.
    pub fn compute_id(&self) -> Result<String> {
        let mut body = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = body {
            map.remove("snapshot_id");
        }
        normalize_floats(&mut body);
        Ok(stable_id("snap", &[&body.to_string()]))
    }

    /// Seconds between collection and `now` (never negative).
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.collected_at).num_seconds().max(0) as u64
    }

    pub fn is_degraded(&self, source: SignalSource) -> bool {
        self.degraded_sources.contains(&source)
    }
}

fn normalize_floats(value: &mut Value) {
    match value {
        Value::Number(n) if n.is_f64() => {
            if let Some(rounded) = n.as_f64().and_then(|f| serde_json::Number::from_f64(round4(f))) {
                *n = rounded;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_floats),
        Value::Object(map) => map.values_mut().for_each(normalize_floats),
        _ => {}
    }
}

/// Live state the plan validator checks action preconditions against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPlannerRuntimeContext {
    pub latest_cpu_usage: Option<f64>,
    pub active_anomaly_count: usize,
    pub current_vcpu: u32,
    pub cooldown_remaining_secs: u64,
}

impl Default for GoalPlannerRuntimeContext {
    fn default() -> Self {
        Self {
            latest_cpu_usage: None,
            active_anomaly_count: 0,
            current_vcpu: 1,
            cooldown_remaining_secs: 0,
        }
    }
}

impl From<&SignalSnapshot> for GoalPlannerRuntimeContext {
    fn from(snapshot: &SignalSnapshot) -> Self {
        Self {
            latest_cpu_usage: snapshot.metrics.latest_cpu_usage,
            active_anomaly_count: snapshot.anomalies.active_count,
            current_vcpu: snapshot.metrics.current_vcpu,
            cooldown_remaining_secs: snapshot.metrics.cooldown_remaining_secs,
        }
    }
}
