use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use warden_core::{GoalIntent, RiskLevel, SignalSource, normalize_goal_text, stable_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Candidate,
    Queued,
    Suppressed,
}

/// Why a candidate was kept out of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    LowConfidence,
    DuplicateGoal,
    CooldownActive,
    StaleSignal,
    PolicyBlocked,
}

impl SuppressionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::DuplicateGoal => "duplicate_goal",
            Self::CooldownActive => "cooldown_active",
            Self::StaleSignal => "stale_signal",
            Self::PolicyBlocked => "policy_blocked",
        }
    }
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-band priority score. `total` is always the exact sum of the bands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityScore {
    /// 0..=40
    pub impact: u32,
    /// 0..=25
    pub urgency: u32,
    /// 0..=20
    pub confidence: u32,
    /// 0..=15
    pub policy_fit: u32,
    pub total: u32,
}

impl PriorityScore {
    pub fn new(impact: u32, urgency: u32, confidence: u32, policy_fit: u32) -> Self {
        Self {
            impact,
            urgency,
            confidence,
            policy_fit,
            total: impact + urgency + confidence + policy_fit,
        }
    }
}

/// A goal derived from one snapshot, before admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalCandidate {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The signal that dominated this candidate.
    pub source: SignalSource,
    pub status: CandidateStatus,
    pub goal: String,
    pub intent: GoalIntent,
    pub risk: RiskLevel,
    pub confidence: f64,
    /// Dedup key over intent and normalized goal text. Never rewritten.
    pub signature: String,
    pub rationale: String,
    pub signal_snapshot_id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<PriorityScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<SuppressionReason>,
}

impl GoalCandidate {
    /// A fresh candidate with its signature and id derived from the inputs.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshot_id: &str,
        source: SignalSource,
        intent: GoalIntent,
        risk: RiskLevel,
        confidence: f64,
        goal: impl Into<String>,
        rationale: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let goal = goal.into();
        let signature = candidate_signature(intent, &goal);
        Self {
            id: candidate_id(snapshot_id, &signature),
            created_at: now,
            updated_at: now,
            source,
            status: CandidateStatus::Candidate,
            goal,
            intent,
            risk,
            confidence: confidence.clamp(0.0, 1.0),
            signature,
            rationale: rationale.into(),
            signal_snapshot_id: snapshot_id.to_string(),
            metadata: Map::new(),
            score: None,
            suppression_reason: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Whether this is the catch-all candidate emitted when no rule fired.
    pub fn is_fallback(&self) -> bool {
        self.metadata.get("fallback").and_then(Value::as_bool) == Some(true)
    }
}

pub fn candidate_signature(intent: GoalIntent, goal: &str) -> String {
    stable_id("sig", &[intent.as_str(), &normalize_goal_text(goal)])
}

pub fn candidate_id(snapshot_id: &str, signature: &str) -> String {
    stable_id("cand", &[snapshot_id, signature])
}

/// Append-only audit entry for a suppressed candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub candidate_id: String,
    pub signature: String,
    pub source: SignalSource,
    pub risk: RiskLevel,
    pub reason_code: SuppressionReason,
    pub message: String,
}

impl SuppressionRecord {
    pub fn for_candidate(
        candidate: &GoalCandidate,
        reason: SuppressionReason,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: stable_id("sup", &[&candidate.id, reason.as_str()]),
            timestamp: now,
            candidate_id: candidate.id.clone(),
            signature: candidate.signature.clone(),
            source: candidate.source,
            risk: candidate.risk,
            reason_code: reason,
            message: message.into(),
        }
    }
}
