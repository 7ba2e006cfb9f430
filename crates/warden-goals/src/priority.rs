//! Priority scoring and suppression.
//!
//! Scores use fixed bands (impact 40, urgency 25, confidence 20, policy fit
//! 15). Suppression checks run in a fixed order and the first match wins:
//! low confidence, duplicate, cooldown, stale signal, policy block.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

use warden_config::GoalManagerConfig;
use warden_core::{GoalIntent, RiskLevel};
use warden_signals::SignalSnapshot;

use crate::candidate::{
    CandidateStatus, GoalCandidate, PriorityScore, SuppressionReason, SuppressionRecord,
};
use crate::queue::GoalQueueItem;

pub const MAX_IMPACT: u32 = 40;
pub const MAX_URGENCY: u32 = 25;
pub const MAX_CONFIDENCE: u32 = 20;
pub const MAX_POLICY_FIT: u32 = 15;

/// Signals newer than this, relative to the snapshot, add urgency.
const RECENT_SIGNAL_SECS: i64 = 600;

#[derive(Debug, Clone)]
pub struct PrioritySettings {
    pub min_candidate_confidence: f64,
    /// How far back a queued candidate still counts as a duplicate.
    pub dedup_window_secs: u64,
    pub max_signal_age_secs: u64,
}

impl From<&GoalManagerConfig> for PrioritySettings {
    fn from(config: &GoalManagerConfig) -> Self {
        Self {
            min_candidate_confidence: config.min_candidate_confidence,
            dedup_window_secs: config.dedup_window_secs,
            max_signal_age_secs: config.max_signal_age_secs,
        }
    }
}

impl Default for PrioritySettings {
    fn default() -> Self {
        Self::from(&GoalManagerConfig::default())
    }
}

fn impact(candidate: &GoalCandidate) -> u32 {
    let base = match candidate.risk {
        RiskLevel::Low => 10,
        RiskLevel::Medium => 20,
        RiskLevel::High => 30,
        RiskLevel::Critical => 35,
    };
    let bonus = match candidate.intent {
        GoalIntent::Stabilize | GoalIntent::Recover => 8,
        GoalIntent::Custom => 3,
        GoalIntent::CostOptimize | GoalIntent::Investigate => 0,
    };
    (base + bonus).min(MAX_IMPACT)
}

fn within_recent(snapshot: &SignalSnapshot, at: Option<DateTime<Utc>>) -> bool {
    at.is_some_and(|at| (snapshot.collected_at - at).num_seconds().abs() <= RECENT_SIGNAL_SECS)
}

fn urgency(snapshot: &SignalSnapshot) -> u32 {
    let mut urgency: i64 = 0;
    if snapshot.anomalies.active_count > 0 {
        urgency += 8;
    }
    if snapshot.anomalies.critical_count > 0 {
        urgency += 6;
    }
    urgency += 2 * snapshot.failover.recent_count.min(3) as i64;
    if within_recent(snapshot, snapshot.anomalies.latest_event_at)
        || within_recent(snapshot, snapshot.failover.latest_event_at)
    {
        urgency += 5;
    }
    if snapshot.metrics.cooldown_remaining_secs > 0 {
        urgency -= 4;
    }
    urgency.clamp(0, MAX_URGENCY as i64) as u32
}

fn policy_fit(snapshot: &SignalSnapshot, candidate: &GoalCandidate) -> u32 {
    let mut fit = MAX_POLICY_FIT;
    if snapshot.policy.read_only_mode && candidate.intent.requires_execution() {
        fit = fit.min(3);
    }
    if !snapshot.policy.auto_scaling_enabled && candidate.intent.is_scaling() {
        fit = fit.min(8);
    }
    if candidate.risk == RiskLevel::Critical {
        fit = fit.min(10);
    }
    fit
}

/// Pure and reproducible for the same snapshot and candidate.
pub fn score_goal_candidate(snapshot: &SignalSnapshot, candidate: &GoalCandidate) -> PriorityScore {
    let confidence = (candidate.confidence.clamp(0.0, 1.0) * MAX_CONFIDENCE as f64).round() as u32;
    PriorityScore::new(
        impact(candidate),
        urgency(snapshot),
        confidence.min(MAX_CONFIDENCE),
        policy_fit(snapshot, candidate),
    )
}

#[derive(Debug, Clone, Default)]
pub struct PrioritizationResult {
    /// Admitted candidates, highest score first.
    pub queued: Vec<GoalCandidate>,
    pub suppressed: Vec<GoalCandidate>,
    /// One record per suppressed candidate, same order.
    pub suppression_records: Vec<SuppressionRecord>,
}

struct Dedup<'a> {
    queue: &'a [GoalQueueItem],
    recent: &'a [GoalCandidate],
    window_start: DateTime<Utc>,
    batch: HashSet<String>,
}

impl Dedup<'_> {
    // A replayed candidate (same id) is not its own duplicate.
    fn is_duplicate(&self, candidate: &GoalCandidate) -> bool {
        let in_queue = self.queue.iter().any(|item| {
            !item.status.is_terminal()
                && item.signature == candidate.signature
                && item.candidate_id != candidate.id
        });
        let in_history = self.recent.iter().any(|c| {
            c.status == CandidateStatus::Queued
                && c.signature == candidate.signature
                && c.id != candidate.id
                && c.created_at >= self.window_start
        });
        in_queue || in_history || self.batch.contains(&candidate.signature)
    }
}

fn check_suppression(
    snapshot: &SignalSnapshot,
    candidate: &GoalCandidate,
    dedup: &Dedup<'_>,
    settings: &PrioritySettings,
    now: DateTime<Utc>,
) -> Option<(SuppressionReason, String)> {
    if candidate.confidence < settings.min_candidate_confidence {
        return Some((
            SuppressionReason::LowConfidence,
            format!(
                "confidence {:.2} below floor {:.2}",
                candidate.confidence, settings.min_candidate_confidence
            ),
        ));
    }
    if dedup.is_duplicate(candidate) {
        return Some((
            SuppressionReason::DuplicateGoal,
            format!("signature {} already queued or recently admitted", candidate.signature),
        ));
    }
    let cooldown = snapshot.metrics.cooldown_remaining_secs;
    if cooldown > 0 && (candidate.intent == GoalIntent::Stabilize || candidate.risk >= RiskLevel::High)
    {
        return Some((
            SuppressionReason::CooldownActive,
            format!("scaler cooldown active for another {cooldown}s"),
        ));
    }
    let age = snapshot.age_secs(now);
    if age > settings.max_signal_age_secs {
        return Some((
            SuppressionReason::StaleSignal,
            format!(
                "snapshot is {age}s old, limit {}s",
                settings.max_signal_age_secs
            ),
        ));
    }
    if snapshot.policy.read_only_mode && candidate.intent.requires_execution() {
        return Some((
            SuppressionReason::PolicyBlocked,
            format!("{} goals need writes but read-only mode is on", candidate.intent),
        ));
    }
    None
}

/// Score every candidate, suppress what must not run, and return the rest sorted.
pub fn prioritize(
    snapshot: &SignalSnapshot,
    candidates: Vec<GoalCandidate>,
    existing_queue: &[GoalQueueItem],
    recent_candidates: &[GoalCandidate],
    settings: &PrioritySettings,
    now: DateTime<Utc>,
) -> PrioritizationResult {
    let mut dedup = Dedup {
        queue: existing_queue,
        recent: recent_candidates,
        window_start: now - Duration::seconds(settings.dedup_window_secs as i64),
        batch: HashSet::new(),
    };
    let mut result = PrioritizationResult::default();

    for mut candidate in candidates {
        let signature = candidate.signature.clone();
        candidate.score = Some(score_goal_candidate(snapshot, &candidate));
        candidate.updated_at = now;

        match check_suppression(snapshot, &candidate, &dedup, settings, now) {
            Some((reason, message)) => {
                info!(
                    candidate_id = %candidate.id,
                    intent = %candidate.intent,
                    reason = reason.as_str(),
                    %message,
                    "candidate suppressed"
                );
                candidate.status = CandidateStatus::Suppressed;
                candidate.suppression_reason = Some(reason);
                result
                    .suppression_records
                    .push(SuppressionRecord::for_candidate(&candidate, reason, message, now));
                result.suppressed.push(candidate);
            }
            None => {
                candidate.status = CandidateStatus::Queued;
                result.queued.push(candidate);
            }
        }
        // Batch order is creation order, so only earlier candidates count.
        dedup.batch.insert(signature);
    }

    // Stable: equal totals keep creation order.
    result
        .queued
        .sort_by_key(|c| std::cmp::Reverse(c.score.map(|s| s.total).unwrap_or(0)));
    debug!(
        queued = result.queued.len(),
        suppressed = result.suppressed.len(),
        "candidates prioritized"
    );
    result
}
