use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::sync::Arc;
use tokio::sync::broadcast;

/// Lifecycle events emitted by the control plane for observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Signal / candidate lifecycle ───────────────────────────
    SignalsCollected {
        snapshot_id: String,
        degraded_sources: Vec<String>,
    },
    CandidateSuppressed {
        candidate_id: String,
        reason_code: String,
    },
    GoalQueued {
        goal_id: String,
        score: u32,
    },

    // ── Dispatch lifecycle ─────────────────────────────────────
    GoalDispatched {
        goal_id: String,
        attempts: u32,
    },
    GoalCompleted {
        goal_id: String,
        plan_id: String,
    },
    GoalFailed {
        goal_id: String,
        reason: String,
    },
    GoalExpired {
        goal_id: String,
    },
    GoalSuperseded {
        goal_id: String,
    },
    ApprovalRequested {
        goal_id: String,
        reason: String,
    },

    // ── Execution ──────────────────────────────────────────────
    StepVerified {
        plan_id: String,
        step_id: String,
        passed: bool,
    },
    RollbackExecuted {
        plan_id: String,
        step_id: String,
        success: bool,
    },

    // ── System ─────────────────────────────────────────────────
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    Shutdown,
}

/// A broadcast-based event bus for system-wide pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
