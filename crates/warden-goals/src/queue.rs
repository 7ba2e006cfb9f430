use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use warden_core::{GoalIntent, Result, RiskLevel, SignalSource, WardenError, stable_id};

use crate::candidate::{GoalCandidate, PriorityScore};

/// Lifecycle of an admitted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Queued,
    Scheduled,
    Running,
    Completed,
    Failed,
    Expired,
}

impl GoalStatus {
    /// Statuses a goal can still leave.
    pub const OPEN: [GoalStatus; 3] = [Self::Queued, Self::Scheduled, Self::Running];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// The transition table. Terminal states have no exits.
    pub fn can_transition_to(&self, next: GoalStatus) -> bool {
        use GoalStatus::*;
        matches!(
            (self, next),
            (Queued, Scheduled | Expired | Failed)
                | (Scheduled, Running | Failed | Expired)
                | (Running, Completed | Failed | Expired)
        )
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn goal_id_for(candidate_id: &str) -> String {
    stable_id("goal", &[candidate_id])
}

/// One admitted goal, persisted under its `goal_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalQueueItem {
    pub goal_id: String,
    pub candidate_id: String,
    pub goal: String,
    pub intent: GoalIntent,
    pub source: SignalSource,
    pub risk: RiskLevel,
    pub confidence: f64,
    pub signature: String,
    pub score: PriorityScore,
    pub status: GoalStatus,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Policy asked for human approval; automatic dispatch skips the item.
    #[serde(default)]
    pub approval_pending: bool,
}

impl GoalQueueItem {
    /// Admit `candidate`. `ttl_secs == 0` means the item never expires.
    pub fn from_candidate(candidate: &GoalCandidate, now: DateTime<Utc>, ttl_secs: u64) -> Self {
        Self {
            goal_id: goal_id_for(&candidate.id),
            candidate_id: candidate.id.clone(),
            goal: candidate.goal.clone(),
            intent: candidate.intent,
            source: candidate.source,
            risk: candidate.risk,
            confidence: candidate.confidence,
            signature: candidate.signature.clone(),
            score: candidate.score.unwrap_or_default(),
            status: GoalStatus::Queued,
            enqueued_at: now,
            scheduled_at: None,
            started_at: None,
            finished_at: None,
            expires_at: (ttl_secs > 0).then(|| now + Duration::seconds(ttl_secs as i64)),
            attempts: 0,
            last_error: None,
            plan_id: None,
            approval_pending: false,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Move to `next`, stamping the matching timestamp. Rejects moves outside the table.
    pub fn transition(&mut self, next: GoalStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(WardenError::InvalidTransition {
                goal_id: self.goal_id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        match next {
            GoalStatus::Scheduled => self.scheduled_at = Some(now),
            GoalStatus::Running => self.started_at = Some(now),
            GoalStatus::Completed | GoalStatus::Failed | GoalStatus::Expired => {
                self.finished_at = Some(now)
            }
            GoalStatus::Queued => {}
        }
        self.status = next;
        Ok(())
    }

    /// Terminal failure with an operator-visible message.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(GoalStatus::Failed, now)?;
        self.last_error = Some(message.into());
        Ok(())
    }
}

/// Highest score first; earlier enqueue wins a tie.
pub fn pick_next<'a>(
    items: &'a [GoalQueueItem],
    include_approval_pending: bool,
) -> Option<&'a GoalQueueItem> {
    items
        .iter()
        .filter(|i| i.status == GoalStatus::Queued)
        .filter(|i| include_approval_pending || !i.approval_pending)
        .min_by(|a, b| {
            b.score
                .total
                .cmp(&a.score.total)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
        })
}
