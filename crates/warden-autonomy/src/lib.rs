//! # warden-autonomy
//!
//! Everything between an accepted goal and a changed system: the autonomy
//! levels (A0-A5), the stateless execution policy, the goal planner and its
//! plan validator, and the executor that runs steps through the external
//! collaborators, verifies the result and rolls back on mismatch.

pub mod executor;
pub mod level;
pub mod plan;
pub mod planner;
pub mod policy;
pub mod rollback;
pub mod validator;
pub mod verify;

pub use executor::{
    ExecutePlanOptions, ExecutionLogEntry, OpsCollaborators, PlanExecutionResult, PlanExecutor,
};
pub use level::AutonomyLevel;
pub use plan::{
    GoalPlan, GoalPlanStep, PlanAction, PlanFailure, PlanSource, PlanStatus, StepStatus,
    ValidationCode, ValidationIssue,
};
pub use planner::{GoalPlanner, PlanRequest, PlannerSettings, infer_intent, rule_template};
pub use policy::{
    PolicyDecision, PolicyDecisionKind, PolicyInput, PolicySettings, evaluate_goal_execution_policy,
};
pub use rollback::{RollbackPlan, RollbackResult, build_rollback_plan, run_rollback};
pub use validator::{
    CandidateStep, GoalPlanCandidate, PlanValidation, ValidationContext,
    validate_goal_plan_candidate,
};
pub use verify::{
    OperationRecord, OperationVerificationResult, health_output_is_ok, verify_operation_outcome,
};
