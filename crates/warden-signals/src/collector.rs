use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use warden_config::SignalsConfig;
use warden_core::ops::*;
use warden_core::{Result, RiskLevel, SignalSource, WardenError};

use crate::snapshot::*;
use crate::trend::{CPU_EPSILON, GAS_EPSILON, TX_POOL_EPSILON, classify_trend};

/// Memory categories that count as incident history.
const INCIDENT_CATEGORIES: [&str; 5] = ["incident", "anomaly", "rca", "failover", "scaling"];
/// Any anomaly z-score at or above this magnitude makes its event critical.
const CRITICAL_Z_SCORE: f64 = 5.0;

/// How far back each source looks.
#[derive(Debug, Clone)]
pub struct SignalWindows {
    pub metrics_samples: usize,
    pub anomaly_event_limit: usize,
    pub failover_lookback_secs: u64,
    pub usage_days: u32,
    pub memory_lookback_secs: u64,
    pub memory_limit: usize,
}

impl Default for SignalWindows {
    fn default() -> Self {
        Self::from(&SignalsConfig::default())
    }
}

impl From<&SignalsConfig> for SignalWindows {
    fn from(config: &SignalsConfig) -> Self {
        Self {
            metrics_samples: config.metrics_samples,
            anomaly_event_limit: config.anomaly_event_limit,
            failover_lookback_secs: config.failover_lookback_secs,
            usage_days: config.usage_days,
            memory_lookback_secs: config.memory_lookback_secs,
            memory_limit: config.memory_limit,
        }
    }
}

/// The read-side collaborators a snapshot is built from.
#[derive(Clone)]
pub struct SignalSources {
    pub metrics: Arc<dyn MetricsSource>,
    pub anomalies: Arc<dyn AnomalySource>,
    pub failover: Arc<dyn FailoverSource>,
    pub usage: Arc<dyn UsageSource>,
    pub memory: Arc<dyn MemorySource>,
    pub scaling: Arc<dyn ScalingStateSource>,
}

impl SignalSources {
    /// Use one object that implements every source contract.
    pub fn from_shared<E>(env: Arc<E>) -> Self
    where
        E: MetricsSource
            + AnomalySource
            + FailoverSource
            + UsageSource
            + MemorySource
            + ScalingStateSource
            + 'static,
    {
        Self {
            metrics: env.clone(),
            anomalies: env.clone(),
            failover: env.clone(),
            usage: env.clone(),
            memory: env.clone(),
            scaling: env,
        }
    }
}

/// Collects [`SignalSnapshot`]s. Never fails: a broken source degrades to its safe default.
pub struct SignalCollector {
    sources: SignalSources,
    chain_type: String,
    read_only_mode: bool,
    source_timeout: Duration,
}

impl SignalCollector {
    pub fn new(sources: SignalSources, chain_type: impl Into<String>, read_only_mode: bool) -> Self {
        Self {
            sources,
            chain_type: chain_type.into(),
            read_only_mode,
            source_timeout: Duration::from_millis(SignalsConfig::default().source_timeout_ms),
        }
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn read_only_mode(&self) -> bool {
        self.read_only_mode
    }

    /// Run `fut` under the per-source timeout. Errors and timeouts are logged and become `None`.
    async fn guarded<T, F>(&self, source: SignalSource, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let err = match tokio::time::timeout(self.source_timeout, fut).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e,
            Err(_) => WardenError::SourceTimeout {
                name: source.as_str().to_string(),
                timeout_ms: self.source_timeout.as_millis() as u64,
            },
        };
        warn!(source = %source, error = %err, "signal source degraded, using safe default");
        None
    }

    /// Build a snapshot as of `now`.
    pub async fn collect(&self, now: DateTime<Utc>, windows: &SignalWindows) -> SignalSnapshot {
        let failover_fut = async {
            let (events, active) = tokio::join!(
                self.sources.failover.get_failover_events(),
                self.sources.failover.get_active_endpoint()
            );
            Ok::<_, WardenError>((events?, active?))
        };
        let memory_query = MemoryQuery {
            from_ts: now - ChronoDuration::seconds(windows.memory_lookback_secs as i64),
            limit: windows.memory_limit,
        };

        let (metrics, anomalies, failover, usage, memory, scaling) = tokio::join!(
            self.guarded(
                SignalSource::Metrics,
                self.sources.metrics.get_recent_metrics(windows.metrics_samples)
            ),
            self.guarded(
                SignalSource::Anomalies,
                self.sources.anomalies.get_events(windows.anomaly_event_limit, 0)
            ),
            self.guarded(SignalSource::Failover, failover_fut),
            self.guarded(
                SignalSource::Cost,
                self.sources.usage.get_usage_summary(windows.usage_days)
            ),
            self.guarded(SignalSource::Memory, self.sources.memory.query_memory(&memory_query)),
            self.guarded(SignalSource::Policy, self.sources.scaling.get_scaling_state()),
        );

        let mut degraded = Vec::new();
        let mut mark = |source: SignalSource, ok: bool| {
            if !ok {
                degraded.push(source);
            }
        };
        mark(SignalSource::Metrics, metrics.is_some());
        mark(SignalSource::Anomalies, anomalies.is_some());
        mark(SignalSource::Failover, failover.is_some());
        mark(SignalSource::Cost, usage.is_some());
        mark(SignalSource::Memory, memory.is_some());
        mark(SignalSource::Policy, scaling.is_some());

        let mut metrics_signal = metrics.map(summarize_metrics).unwrap_or_default();
        let policy = match &scaling {
            Some(state) => {
                metrics_signal.current_vcpu = state.current_vcpu;
                metrics_signal.cooldown_remaining_secs = state.cooldown_remaining_secs;
                PolicySignal {
                    read_only_mode: self.read_only_mode,
                    auto_scaling_enabled: state.auto_scaling_enabled,
                }
            }
            None => {
                metrics_signal.current_vcpu = 1;
                metrics_signal.cooldown_remaining_secs = 0;
                PolicySignal::default()
            }
        };

        let mut snapshot = SignalSnapshot {
            snapshot_id: String::new(),
            collected_at: now,
            chain_type: self.chain_type.clone(),
            sources: SignalSource::ALL.to_vec(),
            metrics: metrics_signal,
            anomalies: anomalies.map(summarize_anomalies).unwrap_or_default(),
            failover: failover
                .map(|(events, active)| summarize_failover(&events, active, now, windows))
                .unwrap_or_default(),
            cost: usage.map(summarize_cost).unwrap_or_default(),
            memory: memory.map(|entries| summarize_memory(&entries)).unwrap_or_default(),
            policy,
            degraded_sources: degraded,
        };

        snapshot.snapshot_id = snapshot.compute_id().unwrap_or_else(|e| {
            warn!(error = %e, "failed to hash snapshot body");
            format!("snap-{}", now.timestamp_millis())
        });

        info!(
            snapshot_id = %snapshot.snapshot_id,
            degraded = snapshot.degraded_sources.len(),
            active_anomalies = snapshot.anomalies.active_count,
            "signals collected"
        );
        snapshot
    }

    /// Fresh planner context: latest CPU, active anomalies, tier and cooldown.
    pub async fn runtime_context(&self, windows: &SignalWindows) -> GoalPlannerRuntimeContext {
        let (metrics, anomalies, scaling) = tokio::join!(
            self.guarded(SignalSource::Metrics, self.sources.metrics.get_recent_metrics(1)),
            self.guarded(
                SignalSource::Anomalies,
                self.sources.anomalies.get_events(windows.anomaly_event_limit, 0)
            ),
            self.guarded(SignalSource::Policy, self.sources.scaling.get_scaling_state()),
        );
        let defaults = GoalPlannerRuntimeContext::default();
        let context = GoalPlannerRuntimeContext {
            latest_cpu_usage: metrics.and_then(|m| summarize_metrics(m).latest_cpu_usage),
            active_anomaly_count: anomalies
                .map(|page| summarize_anomalies(page).active_count)
                .unwrap_or(defaults.active_anomaly_count),
            current_vcpu: scaling
                .as_ref()
                .map(|s| s.current_vcpu)
                .unwrap_or(defaults.current_vcpu),
            cooldown_remaining_secs: scaling
                .as_ref()
                .map(|s| s.cooldown_remaining_secs)
                .unwrap_or(defaults.cooldown_remaining_secs),
        };
        debug!(?context, "planner runtime context collected");
        context
    }
}

fn summarize_metrics(mut samples: Vec<MetricSample>) -> MetricsSignal {
    samples.sort_by_key(|s| s.timestamp);
    let cpu: Vec<f64> = samples.iter().map(|s| s.cpu_usage).collect();
    let tx_pool: Vec<f64> = samples.iter().map(|s| s.tx_pool_pending).collect();
    let gas: Vec<f64> = samples.iter().map(|s| s.gas_used_ratio).collect();
    let latest = samples.last();
    MetricsSignal {
        latest_cpu_usage: latest.map(|s| s.cpu_usage),
        latest_tx_pool_pending: latest.map(|s| s.tx_pool_pending),
        latest_gas_used_ratio: latest.map(|s| s.gas_used_ratio),
        current_vcpu: 0,
        cooldown_remaining_secs: 0,
        cpu_trend: classify_trend(&cpu, CPU_EPSILON),
        tx_pool_trend: classify_trend(&tx_pool, TX_POOL_EPSILON),
        gas_trend: classify_trend(&gas, GAS_EPSILON),
        sample_count: samples.len(),
    }
}

fn is_critical(event: &AnomalyEvent) -> bool {
    event
        .deep_analysis
        .as_ref()
        .is_some_and(|d| d.severity == RiskLevel::Critical)
        || event
            .anomalies
            .iter()
            .any(|a| a.z_score.abs() >= CRITICAL_Z_SCORE)
}

fn summarize_anomalies(page: AnomalyEventPage) -> AnomalySignal {
    let active: Vec<&AnomalyEvent> = page
        .events
        .iter()
        .filter(|e| e.status == AnomalyEventStatus::Active)
        .collect();
    AnomalySignal {
        active_count: page.active_count.max(active.len()),
        critical_count: active.iter().filter(|e| is_critical(e)).count(),
        latest_event_at: active.iter().map(|e| e.timestamp).max(),
    }
}

fn summarize_failover(
    events: &[FailoverEvent],
    active_endpoint: String,
    now: DateTime<Utc>,
    windows: &SignalWindows,
) -> FailoverSignal {
    let cutoff = now - ChronoDuration::seconds(windows.failover_lookback_secs as i64);
    FailoverSignal {
        recent_count: events.iter().filter(|e| e.timestamp >= cutoff).count(),
        latest_event_at: events.iter().map(|e| e.timestamp).max(),
        active_endpoint: Some(active_endpoint).filter(|url| !url.is_empty()),
    }
}

fn summarize_cost(usage: UsageSummary) -> CostSignal {
    CostSignal {
        avg_vcpu: usage.avg_vcpu,
        peak_vcpu: usage.peak_vcpu,
        avg_utilization: usage.avg_utilization,
        data_point_count: usage.data_point_count,
    }
}

fn is_incident_like(entry: &MemoryEntry) -> bool {
    let category = entry.category.to_lowercase();
    INCIDENT_CATEGORIES.contains(&category.as_str())
        || entry.summary.to_lowercase().contains("incident")
}

fn summarize_memory(entries: &[MemoryEntry]) -> MemorySignal {
    MemorySignal {
        recent_count: entries.len(),
        incident_count: entries.iter().filter(|e| is_incident_like(e)).count(),
        high_severity_count: entries
            .iter()
            .filter(|e| e.severity >= RiskLevel::High)
            .count(),
        latest_entry_at: entries.iter().map(|e| e.timestamp).max(),
    }
}
