//! # warden-goals
//!
//! From snapshot to terminal goal:
//!
//! - [`generator`]: rule-based candidates, optionally rewritten by a model.
//! - [`priority`]: fixed-band scoring and ordered suppression checks.
//! - [`queue`]: the queue item state machine.
//! - [`manager`]: tick, dispatch, expiry and state reads over a [`warden_store::StateStore`].
//! - [`driver`]: the periodic tick and dispatch loops.

pub mod candidate;
pub mod driver;
pub mod generator;
pub mod manager;
pub mod priority;
pub mod queue;

pub use candidate::{
    CandidateStatus, GoalCandidate, PriorityScore, SuppressionReason, SuppressionRecord,
    candidate_id, candidate_signature,
};
pub use driver::GoalDriver;
pub use generator::{
    CandidateGenerator, GenerationResult, GeneratorSettings, generate_rule_candidates,
};
pub use manager::{
    DispatchOptions, DispatchOutcome, GoalManager, GoalManagerSettings, GoalManagerState,
    TickSummary,
};
pub use priority::{PrioritizationResult, PrioritySettings, prioritize, score_goal_candidate};
pub use queue::{GoalQueueItem, GoalStatus, goal_id_for, pick_next};
