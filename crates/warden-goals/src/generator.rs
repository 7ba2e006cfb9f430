//! Candidate generation: a deterministic rule layer over the snapshot, with
//! an optional model pass that rewrites goal text and rationale.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use warden_config::GoalManagerConfig;
use warden_core::{GoalIntent, RiskLevel, SignalSource};
use warden_llm::{ChatRequest, ModelRouter, ModelTier, extract_json_object};
use warden_signals::{SignalSnapshot, Trend};

use crate::candidate::GoalCandidate;

/// Longest goal text accepted from a model rewrite, in characters.
pub const MAX_GOAL_CHARS: usize = 240;
/// Usage history with at least this many points raises cost confidence.
const COST_HISTORY_POINTS: usize = 24;

const REWRITE_SYSTEM_PROMPT: &str = "You refine goal candidates for an L2 infrastructure \
operations agent. Keep every goal a single actionable sentence grounded in the signals given. \
Respond with a single strict JSON object and nothing else: no prose, no markdown.";

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub llm_enabled: bool,
    pub max_llm_candidates: usize,
    pub failover_threshold: usize,
    pub cost_utilization_floor: f64,
    pub cost_peak_vcpu_floor: f64,
    pub low_cpu_ceiling: f64,
}

impl From<&GoalManagerConfig> for GeneratorSettings {
    fn from(config: &GoalManagerConfig) -> Self {
        Self {
            llm_enabled: config.llm_enhancement_enabled,
            max_llm_candidates: config.max_llm_candidates,
            failover_threshold: config.failover_threshold,
            cost_utilization_floor: config.cost_utilization_floor,
            cost_peak_vcpu_floor: config.cost_peak_vcpu_floor,
            low_cpu_ceiling: config.low_cpu_ceiling,
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::from(&GoalManagerConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Never empty.
    pub candidates: Vec<GoalCandidate>,
    pub llm_enhanced: bool,
    /// Set when the model pass was attempted and fell back to the rule output.
    pub llm_fallback_reason: Option<String>,
}

fn rising_metrics(snapshot: &SignalSnapshot) -> Vec<&'static str> {
    let m = &snapshot.metrics;
    [
        ("cpu", m.cpu_trend),
        ("tx pool", m.tx_pool_trend),
        ("gas", m.gas_trend),
    ]
    .into_iter()
    .filter(|(_, trend)| *trend == Trend::Rising)
    .map(|(name, _)| name)
    .collect()
}

fn stabilize_rule(snapshot: &SignalSnapshot, now: DateTime<Utc>) -> Option<GoalCandidate> {
    let anomalies = &snapshot.anomalies;
    let rising = rising_metrics(snapshot);
    if (anomalies.active_count == 0 && anomalies.critical_count == 0) || rising.is_empty() {
        return None;
    }
    let critical = anomalies.critical_count > 0;
    let mut confidence = 0.7;
    if critical {
        confidence += 0.1;
    }
    if snapshot.memory.incident_count > 0 {
        confidence += 0.05;
    }
    confidence += 0.05 * (rising.len() - 1) as f64;

    Some(GoalCandidate::new(
        &snapshot.snapshot_id,
        SignalSource::Anomalies,
        GoalIntent::Stabilize,
        if critical { RiskLevel::High } else { RiskLevel::Medium },
        confidence.min(0.95),
        "Stabilize the execution layer under rising load while anomalies are active",
        format!(
            "{} active anomalies ({} critical) with rising {}",
            anomalies.active_count,
            anomalies.critical_count,
            rising.join(", ")
        ),
        now,
    ))
}

fn failover_rule(
    snapshot: &SignalSnapshot,
    settings: &GeneratorSettings,
    now: DateTime<Utc>,
) -> Option<GoalCandidate> {
    let count = snapshot.failover.recent_count;
    let threshold = settings.failover_threshold.max(1);
    if count < threshold {
        return None;
    }
    let risk = if count >= threshold * 2 {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    };
    let confidence = (0.65 + 0.05 * (count - threshold) as f64).min(0.9);
    let endpoint = snapshot
        .failover
        .active_endpoint
        .as_deref()
        .unwrap_or("unknown");

    Some(GoalCandidate::new(
        &snapshot.snapshot_id,
        SignalSource::Failover,
        GoalIntent::Recover,
        risk,
        confidence,
        "Recover stable RPC routing after repeated endpoint failovers",
        format!("{count} failovers inside the lookback window, active endpoint {endpoint}"),
        now,
    ))
}

fn cost_rule(
    snapshot: &SignalSnapshot,
    settings: &GeneratorSettings,
    now: DateTime<Utc>,
) -> Option<GoalCandidate> {
    let cost = &snapshot.cost;
    let cpu = snapshot.metrics.latest_cpu_usage?;
    let healthy = snapshot.anomalies.active_count == 0 && cpu < settings.low_cpu_ceiling;
    let over_provisioned = cost.avg_utilization < settings.cost_utilization_floor
        && cost.peak_vcpu >= settings.cost_peak_vcpu_floor;
    if !healthy || !over_provisioned {
        return None;
    }
    let confidence = if cost.data_point_count >= COST_HISTORY_POINTS {
        0.8
    } else {
        0.7
    };

    Some(GoalCandidate::new(
        &snapshot.snapshot_id,
        SignalSource::Cost,
        GoalIntent::CostOptimize,
        RiskLevel::Low,
        confidence,
        "Reduce execution tier cost while utilization stays low against a high peak tier",
        format!(
            "average utilization {:.1}% with peak {:.1} vCPU, latest cpu {:.1}%",
            cost.avg_utilization, cost.peak_vcpu, cpu
        ),
        now,
    ))
}

fn fallback_candidate(snapshot: &SignalSnapshot, now: DateTime<Utc>) -> GoalCandidate {
    let source = if snapshot.memory.incident_count > 0 {
        SignalSource::Memory
    } else {
        SignalSource::Metrics
    };
    let rationale = if snapshot.degraded_sources.is_empty() {
        "no rule fired on the current signals".to_string()
    } else {
        format!(
            "no rule fired; {} signal sources degraded",
            snapshot.degraded_sources.len()
        )
    };
    GoalCandidate::new(
        &snapshot.snapshot_id,
        source,
        GoalIntent::Investigate,
        RiskLevel::Low,
        0.55,
        "Review current operational signals for emerging issues",
        rationale,
        now,
    )
    .with_metadata("fallback", Value::Bool(true))
}

/// Rule layer. Pure in `snapshot`; always returns at least one candidate.
pub fn generate_rule_candidates(
    snapshot: &SignalSnapshot,
    settings: &GeneratorSettings,
    now: DateTime<Utc>,
) -> Vec<GoalCandidate> {
    let candidates: Vec<GoalCandidate> = [
        stabilize_rule(snapshot, now),
        failover_rule(snapshot, settings, now),
        cost_rule(snapshot, settings, now),
    ]
    .into_iter()
    .flatten()
    .collect();

    if candidates.is_empty() {
        return vec![fallback_candidate(snapshot, now)];
    }
    candidates
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub struct CandidateGenerator {
    router: Arc<ModelRouter>,
    settings: GeneratorSettings,
}

impl CandidateGenerator {
    pub fn new(router: Arc<ModelRouter>, settings: GeneratorSettings) -> Self {
        Self { router, settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub async fn generate(&self, snapshot: &SignalSnapshot, now: DateTime<Utc>) -> GenerationResult {
        let candidates = generate_rule_candidates(snapshot, &self.settings, now);
        debug!(
            snapshot_id = %snapshot.snapshot_id,
            count = candidates.len(),
            "rule candidates generated"
        );

        if !self.settings.llm_enabled || self.settings.max_llm_candidates == 0 {
            return GenerationResult {
                candidates,
                llm_enhanced: false,
                llm_fallback_reason: None,
            };
        }

        // Rewrites land on a copy so a failed pass leaves the rule output untouched.
        let mut rewritten = candidates.clone();
        match self.enhance(snapshot, &mut rewritten).await {
            Ok(applied) => {
                info!(applied, "goal candidates rewritten by model");
                GenerationResult {
                    candidates: rewritten,
                    llm_enhanced: true,
                    llm_fallback_reason: None,
                }
            }
            Err(reason) => {
                warn!(reason, "candidate enhancement fell back to rule output");
                GenerationResult {
                    candidates,
                    llm_enhanced: false,
                    llm_fallback_reason: Some(reason.to_string()),
                }
            }
        }
    }

    /// Returns how many candidates were rewritten, or the fallback reason code.
    async fn enhance(
        &self,
        snapshot: &SignalSnapshot,
        candidates: &mut [GoalCandidate],
    ) -> std::result::Result<usize, &'static str> {
        if !self.router.has_providers() {
            return Err("no_ai_provider_key");
        }
        let limit = self.settings.max_llm_candidates.min(candidates.len());
        let request = ChatRequest {
            system_prompt: REWRITE_SYSTEM_PROMPT.to_string(),
            user_prompt: rewrite_prompt(snapshot, &candidates[..limit]),
            model_tier: ModelTier::Fast,
        };

        let reply = self.router.chat_completion(&request).await.map_err(|e| {
            warn!(error = %e, "candidate rewrite request failed");
            "llm_unavailable"
        })?;
        let parsed = extract_json_object(&reply.content).map_err(|e| {
            warn!(error = %e, "candidate rewrite response unparseable");
            "llm_parse_error"
        })?;
        let entries = parsed
            .get("candidates")
            .and_then(Value::as_array)
            .ok_or("llm_parse_error")?;

        let mut applied = 0;
        for entry in entries {
            let Some(index) = entry.get("index").and_then(Value::as_u64).map(|i| i as usize) else {
                continue;
            };
            let Some(goal) = entry
                .get("goal")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|g| !g.is_empty())
            else {
                continue;
            };
            if index >= limit {
                continue;
            }
            let candidate = &mut candidates[index];
            candidate.goal = truncate_chars(goal, MAX_GOAL_CHARS);
            if let Some(rationale) = entry
                .get("rationale")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|r| !r.is_empty())
            {
                candidate.rationale = rationale.to_string();
            }
            candidate
                .metadata
                .insert("llm_enhanced".into(), Value::Bool(true));
            applied += 1;
        }

        if applied == 0 {
            return Err("llm_parse_error");
        }
        Ok(applied)
    }
}

fn rewrite_prompt(snapshot: &SignalSnapshot, candidates: &[GoalCandidate]) -> String {
    let listed: Vec<Value> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| {
            json!({
                "index": index,
                "intent": c.intent.as_str(),
                "risk": c.risk.as_str(),
                "goal": c.goal,
                "rationale": c.rationale,
            })
        })
        .collect();
    let context = json!({
        "chainType": snapshot.chain_type,
        "latestCpuUsage": snapshot.metrics.latest_cpu_usage,
        "cpuTrend": snapshot.metrics.cpu_trend,
        "currentVcpu": snapshot.metrics.current_vcpu,
        "cooldownRemainingSecs": snapshot.metrics.cooldown_remaining_secs,
        "activeAnomalies": snapshot.anomalies.active_count,
        "criticalAnomalies": snapshot.anomalies.critical_count,
        "recentFailovers": snapshot.failover.recent_count,
        "avgUtilization": snapshot.cost.avg_utilization,
        "peakVcpu": snapshot.cost.peak_vcpu,
        "incidentHistory": snapshot.memory.incident_count,
    });

    format!(
        "Signals:\n{context}\n\nCandidates:\n{}\n\n\
         Rewrite the goal and rationale of each candidate so an operator can act on it. \
         Do not change intent or risk. Keep each goal under {MAX_GOAL_CHARS} characters.\n\
         Respond with exactly: {{\"candidates\":[{{\"index\":0,\"goal\":\"...\",\"rationale\":\"...\"}}]}}",
        Value::Array(listed)
    )
}
