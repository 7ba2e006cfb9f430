//! The goal manager: one tick turns signals into queued goals, one dispatch
//! advances the top queued goal to a terminal state.
//!
//! All state lives in the [`StateStore`]. Single-flight dispatch is enforced
//! by the compare-and-set active-goal pointer, so any number of dispatch
//! triggers (driver, CLI, tool calls) may share one store.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use warden_autonomy::{
    ExecutePlanOptions, GoalPlan, GoalPlanner, OpsCollaborators, PlanExecutionResult,
    PlanExecutor, PlanRequest, PlannerSettings, PolicyDecision, PolicySettings,
};
use warden_config::{GoalManagerConfig, WardenConfig};
use warden_core::{Event, EventBus, Initiator, Result, WardenError};
use warden_llm::ModelRouter;
use warden_signals::{SignalCollector, SignalSources, SignalWindows};
use warden_store::{ACTIVE_GOAL_POINTER, Collection, StateStore};

use crate::candidate::{GoalCandidate, SuppressionRecord};
use crate::generator::{CandidateGenerator, GeneratorSettings};
use crate::priority::{PrioritySettings, prioritize};
use crate::queue::{GoalQueueItem, GoalStatus, pick_next};

/// Candidates scanned for duplicate history on each tick.
const RECENT_CANDIDATE_SCAN: usize = 500;

#[derive(Debug, Clone)]
pub struct GoalManagerSettings {
    pub enabled: bool,
    pub dispatch_enabled: bool,
    pub dry_run: bool,
    pub allow_writes: bool,
    pub goal_ttl_secs: u64,
    pub stale_running_secs: u64,
    pub state_list_limit: usize,
    pub priority: PrioritySettings,
}

impl From<&GoalManagerConfig> for GoalManagerSettings {
    fn from(config: &GoalManagerConfig) -> Self {
        Self {
            enabled: config.enabled,
            dispatch_enabled: config.dispatch_enabled,
            dry_run: config.dry_run,
            allow_writes: config.allow_writes,
            goal_ttl_secs: config.goal_ttl_secs,
            stale_running_secs: config.stale_running_secs,
            state_list_limit: config.state_list_limit,
            priority: PrioritySettings::from(config),
        }
    }
}

/// Caller overrides for one dispatch. Unset fields fall back to configuration.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Dispatch this goal instead of the top of the queue.
    pub goal_id: Option<String>,
    /// Human approval granted for this dispatch.
    pub approved: bool,
    pub dry_run: Option<bool>,
    pub allow_writes: Option<bool>,
    pub initiated_by: Initiator,
    /// Logical time; defaults to the wall clock.
    pub now: Option<DateTime<Utc>>,
}

impl DispatchOptions {
    pub fn scheduler() -> Self {
        Self {
            initiated_by: Initiator::Scheduler,
            ..Self::operator()
        }
    }

    pub fn operator() -> Self {
        Self {
            goal_id: None,
            approved: false,
            dry_run: None,
            allow_writes: None,
            initiated_by: Initiator::Operator,
            now: None,
        }
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::operator()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The manager or dispatch is switched off.
    Disabled,
    /// Nothing dispatchable is queued.
    Idle,
    /// Another goal holds the active-goal pointer.
    Busy { active_goal_id: String },
    Denied {
        goal_id: String,
        decision: PolicyDecision,
    },
    /// The goal stays queued until dispatched with approval.
    ApprovalRequired {
        goal_id: String,
        decision: PolicyDecision,
    },
    Completed {
        goal_id: String,
        execution: Box<PlanExecutionResult>,
    },
    Failed {
        goal_id: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        execution: Option<Box<PlanExecutionResult>>,
    },
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Idle => "idle",
            Self::Busy { .. } => "busy",
            Self::Denied { .. } => "denied",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn goal_id(&self) -> Option<&str> {
        match self {
            Self::Disabled | Self::Idle => None,
            Self::Busy { active_goal_id } => Some(active_goal_id),
            Self::Denied { goal_id, .. }
            | Self::ApprovalRequired { goal_id, .. }
            | Self::Completed { goal_id, .. }
            | Self::Failed { goal_id, .. } => Some(goal_id),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    /// False when the manager is disabled and nothing ran.
    pub ran: bool,
    pub snapshot_id: Option<String>,
    pub generated_count: usize,
    pub queued_count: usize,
    pub suppressed_count: usize,
    /// Non-terminal items after the tick.
    pub queue_depth: usize,
    pub expired_count: usize,
    pub llm_enhanced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalManagerState {
    pub active_goal_id: Option<String>,
    pub active_since: Option<DateTime<Utc>>,
    pub queue_depth: usize,
    /// Newest items, oldest first.
    pub queue: Vec<GoalQueueItem>,
    pub candidates: Vec<GoalCandidate>,
    pub suppressions: Vec<SuppressionRecord>,
}

pub struct GoalManager {
    store: Arc<dyn StateStore>,
    collector: Arc<SignalCollector>,
    windows: SignalWindows,
    generator: CandidateGenerator,
    planner: GoalPlanner,
    executor: PlanExecutor,
    settings: GoalManagerSettings,
    events: EventBus,
}

fn decode_all<T: DeserializeOwned>(collection: Collection, values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(collection = collection.as_str(), error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

impl GoalManager {
    pub fn new(
        config: &WardenConfig,
        store: Arc<dyn StateStore>,
        sources: SignalSources,
        ops: OpsCollaborators,
        router: Arc<ModelRouter>,
        events: EventBus,
    ) -> Self {
        let collector = Arc::new(
            SignalCollector::new(
                sources,
                config.signals.chain_type.clone(),
                config.autonomy.read_only_mode,
            )
            .with_source_timeout(Duration::from_millis(config.signals.source_timeout_ms)),
        );
        let windows = SignalWindows::from(&config.signals);
        let policy = PolicySettings::from(&config.autonomy);

        Self {
            store,
            generator: CandidateGenerator::new(
                Arc::clone(&router),
                GeneratorSettings::from(&config.goal_manager),
            ),
            planner: GoalPlanner::new(
                router,
                Arc::clone(&collector),
                windows.clone(),
                PlannerSettings::from_config(config),
            ),
            executor: PlanExecutor::new(ops, policy).with_events(events.clone()),
            collector,
            windows,
            settings: GoalManagerSettings::from(&config.goal_manager),
            events,
        }
    }

    pub fn settings(&self) -> &GoalManagerSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    // ── Store helpers ──────────────────────────────────────────

    /// Non-terminal queue items only; finished goals are read through `list_goal_manager_state`.
    fn load_open_queue(&self) -> Result<Vec<GoalQueueItem>> {
        let statuses = GoalStatus::OPEN.map(|s| s.as_str());
        let values = self.store.list_by_status(Collection::QueueItems, &statuses)?;
        Ok(decode_all(Collection::QueueItems, values))
    }

    fn find_item(&self, goal_id: &str) -> Result<Option<GoalQueueItem>> {
        self.store
            .get(Collection::QueueItems, goal_id)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(WardenError::from)
    }

    fn load_item(&self, goal_id: &str) -> Result<GoalQueueItem> {
        self.find_item(goal_id)?
            .ok_or_else(|| WardenError::GoalNotFound(goal_id.to_string()))
    }

    fn save_item(&self, item: &GoalQueueItem) -> Result<()> {
        self.store
            .upsert(Collection::QueueItems, &item.goal_id, &serde_json::to_value(item)?)
    }

    fn is_stale(&self, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        since.is_none_or(|at| (now - at).num_seconds() >= self.settings.stale_running_secs as i64)
    }

    // ── Tick ───────────────────────────────────────────────────

    /// Expire, collect, generate, prioritize, persist and enqueue.
    pub async fn tick_goal_manager(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        if !self.settings.enabled {
            info!("goal manager disabled, skipping tick");
            return Ok(TickSummary::default());
        }

        let expired_count = self.expire_goal_queue_items(now)?;
        let snapshot = self.collector.collect(now, &self.windows).await;
        self.events.publish(Event::SignalsCollected {
            snapshot_id: snapshot.snapshot_id.clone(),
            degraded_sources: snapshot
                .degraded_sources
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        });

        let generation = self.generator.generate(&snapshot, now).await;
        let generated_count = generation.candidates.len();

        let queue = self.load_open_queue()?;
        let recent: Vec<GoalCandidate> = decode_all(
            Collection::Candidates,
            self.store
                .list(Collection::Candidates, Some(RECENT_CANDIDATE_SCAN))?,
        );
        let result = prioritize(
            &snapshot,
            generation.candidates,
            &queue,
            &recent,
            &self.settings.priority,
            now,
        );

        for candidate in result.queued.iter().chain(&result.suppressed) {
            self.store.insert_if_absent(
                Collection::Candidates,
                &candidate.id,
                &serde_json::to_value(candidate)?,
            )?;
        }
        self.persist_suppression_records(&result.suppression_records)?;
        let queued_count = self.enqueue(&result.queued, now)?;

        let queue_depth = self.load_open_queue()?.len();

        let summary = TickSummary {
            ran: true,
            snapshot_id: Some(snapshot.snapshot_id),
            generated_count,
            queued_count,
            suppressed_count: result.suppressed.len(),
            queue_depth,
            expired_count,
            llm_enhanced: generation.llm_enhanced,
            llm_fallback_reason: generation.llm_fallback_reason,
        };
        info!(
            generated = summary.generated_count,
            queued = summary.queued_count,
            suppressed = summary.suppressed_count,
            depth = summary.queue_depth,
            "goal manager tick finished"
        );
        Ok(summary)
    }

    /// Append suppression records; replays of the same record are ignored.
    pub fn persist_suppression_records(&self, records: &[SuppressionRecord]) -> Result<usize> {
        let mut written = 0;
        for record in records {
            let inserted = self.store.insert_if_absent(
                Collection::Suppressions,
                &record.id,
                &serde_json::to_value(record)?,
            )?;
            if inserted {
                written += 1;
                self.events.publish(Event::CandidateSuppressed {
                    candidate_id: record.candidate_id.clone(),
                    reason_code: record.reason_code.as_str().to_string(),
                });
            }
        }
        Ok(written)
    }

    fn enqueue(&self, admitted: &[GoalCandidate], now: DateTime<Utc>) -> Result<usize> {
        let mut count = 0;
        for candidate in admitted {
            let item = GoalQueueItem::from_candidate(candidate, now, self.settings.goal_ttl_secs);
            if self.store.insert_if_absent(
                Collection::QueueItems,
                &item.goal_id,
                &serde_json::to_value(&item)?,
            )? {
                info!(
                    goal_id = %item.goal_id,
                    intent = %item.intent,
                    score = item.score.total,
                    "goal queued"
                );
                self.events.publish(Event::GoalQueued {
                    goal_id: item.goal_id,
                    score: item.score.total,
                });
                count += 1;
            }
        }
        Ok(count)
    }

    // ── Expiry ─────────────────────────────────────────────────

    /// Mark every non-terminal item past its `expires_at` as expired. The
    /// goal held by a fresh active pointer is left alone.
    pub fn expire_goal_queue_items(&self, now: DateTime<Utc>) -> Result<usize> {
        let pointer = self.store.get_pointer(ACTIVE_GOAL_POINTER)?;
        let pointer_stale = self.is_stale(pointer.updated_at, now);
        let mut expired = 0;

        for mut item in self.load_open_queue()? {
            if item.status.is_terminal() || !item.is_expired_at(now) {
                continue;
            }
            let held = pointer.value.as_deref() == Some(item.goal_id.as_str());
            if held && !pointer_stale {
                continue;
            }
            item.transition(GoalStatus::Expired, now)?;
            item.last_error = Some("expired before reaching a terminal state".into());
            self.save_item(&item)?;
            if held {
                self.store.compare_and_set_pointer(
                    ACTIVE_GOAL_POINTER,
                    Some(&item.goal_id),
                    None,
                    now,
                )?;
            }
            info!(goal_id = %item.goal_id, "goal expired");
            self.events.publish(Event::GoalExpired {
                goal_id: item.goal_id,
            });
            expired += 1;
        }
        Ok(expired)
    }

    // ── Dispatch ───────────────────────────────────────────────

    /// Returns the goal holding a fresh pointer. A stale holder is superseded.
    fn active_goal(&self, now: DateTime<Utc>) -> Result<Option<String>> {
        let pointer = self.store.get_pointer(ACTIVE_GOAL_POINTER)?;
        let Some(active) = pointer.value else {
            return Ok(None);
        };
        if !self.is_stale(pointer.updated_at, now) {
            return Ok(Some(active));
        }

        warn!(goal_id = %active, "superseding stale running goal");
        if let Some(mut item) = self.find_item(&active)?
            && !item.status.is_terminal()
        {
            item.fail(
                format!(
                    "superseded: held the active-goal pointer longer than {}s",
                    self.settings.stale_running_secs
                ),
                now,
            )?;
            self.save_item(&item)?;
        }
        self.store
            .compare_and_set_pointer(ACTIVE_GOAL_POINTER, Some(&active), None, now)?;
        self.events.publish(Event::GoalSuperseded { goal_id: active });
        Ok(None)
    }

    /// Advance one queued goal to a terminal state.
    pub async fn dispatch_top_goal(&self, options: &DispatchOptions) -> Result<DispatchOutcome> {
        if !self.settings.enabled || !self.settings.dispatch_enabled {
            return Ok(DispatchOutcome::Disabled);
        }
        let now = options.now.unwrap_or_else(Utc::now);
        let dry_run = options.dry_run.unwrap_or(self.settings.dry_run);
        let allow_writes = options.allow_writes.unwrap_or(self.settings.allow_writes);

        if let Some(active_goal_id) = self.active_goal(now)? {
            info!(goal_id = %active_goal_id, "dispatch skipped, a goal is already running");
            return Ok(DispatchOutcome::Busy { active_goal_id });
        }

        let mut item = match &options.goal_id {
            Some(goal_id) => {
                let item = self.load_item(goal_id)?;
                if item.status != GoalStatus::Queued {
                    return Err(WardenError::InvalidTransition {
                        goal_id: item.goal_id,
                        from: item.status.to_string(),
                        to: GoalStatus::Scheduled.to_string(),
                    });
                }
                item
            }
            None => {
                let queue = self.load_open_queue()?;
                match pick_next(&queue, options.approved) {
                    Some(item) => item.clone(),
                    None => return Ok(DispatchOutcome::Idle),
                }
            }
        };

        let decision = self.executor.policy().evaluate(
            options.initiated_by,
            allow_writes,
            dry_run,
            item.risk,
            Some(item.confidence),
        );
        if decision.is_denied() {
            let reason = format!("policy denied ({}): {}", decision.reason_code, decision.message);
            warn!(goal_id = %item.goal_id, reason_code = %decision.reason_code, "dispatch denied by policy");
            item.fail(reason.clone(), now)?;
            self.save_item(&item)?;
            self.events.publish(Event::GoalFailed {
                goal_id: item.goal_id.clone(),
                reason,
            });
            return Ok(DispatchOutcome::Denied {
                goal_id: item.goal_id,
                decision,
            });
        }
        if decision.requires_approval() && !options.approved {
            info!(goal_id = %item.goal_id, reason = %decision.message, "goal awaiting approval");
            item.approval_pending = true;
            self.save_item(&item)?;
            self.events.publish(Event::ApprovalRequested {
                goal_id: item.goal_id.clone(),
                reason: decision.message.clone(),
            });
            return Ok(DispatchOutcome::ApprovalRequired {
                goal_id: item.goal_id,
                decision,
            });
        }

        let goal_id = item.goal_id.clone();
        if !self
            .store
            .compare_and_set_pointer(ACTIVE_GOAL_POINTER, None, Some(&goal_id), now)?
        {
            let active_goal_id = self
                .store
                .get_pointer(ACTIVE_GOAL_POINTER)?
                .value
                .unwrap_or_default();
            return Ok(DispatchOutcome::Busy { active_goal_id });
        }

        let run_options = ExecutePlanOptions {
            dry_run,
            allow_writes,
            initiated_by: options.initiated_by,
            approved: options.approved,
            confidence: Some(item.confidence),
        };
        let outcome = match self.run_goal(&goal_id, &run_options, now).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(goal_id = %goal_id, error = %e, "dispatch failed");
                self.record_dispatch_error(&goal_id, &e.to_string(), now)
                    .map(|_| DispatchOutcome::Failed {
                        goal_id: goal_id.clone(),
                        reason: e.to_string(),
                        execution: None,
                    })
            }
        };

        // Released on every path, including errors above.
        let released =
            self.store
                .compare_and_set_pointer(ACTIVE_GOAL_POINTER, Some(&goal_id), None, Utc::now());
        match &released {
            Ok(false) => warn!(goal_id = %goal_id, "active-goal pointer was taken over during dispatch"),
            Err(e) => error!(goal_id = %goal_id, error = %e, "failed to release active-goal pointer"),
            Ok(true) => {}
        }
        let outcome = outcome?;
        released?;
        Ok(outcome)
    }

    async fn run_goal(
        &self,
        goal_id: &str,
        options: &ExecutePlanOptions,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        // Re-read under the pointer: another trigger may have moved it.
        let mut item = self.load_item(goal_id)?;
        if item.status != GoalStatus::Queued {
            info!(goal_id, status = %item.status, "goal no longer queued");
            return Ok(DispatchOutcome::Idle);
        }

        item.attempts += 1;
        item.approval_pending = false;
        item.transition(GoalStatus::Scheduled, now)?;
        self.save_item(&item)?;
        item.transition(GoalStatus::Running, now)?;
        self.save_item(&item)?;
        info!(goal_id, attempts = item.attempts, intent = %item.intent, "goal dispatched");
        self.events.publish(Event::GoalDispatched {
            goal_id: goal_id.to_string(),
            attempts: item.attempts,
        });

        let plan = self
            .planner
            .build(&PlanRequest {
                goal: item.goal.clone(),
                intent: Some(item.intent),
                dry_run: options.dry_run,
                allow_writes: options.allow_writes,
            })
            .await;
        item.plan_id = Some(plan.plan_id.clone());
        let execution = self.executor.execute_goal_plan(&plan, options).await;
        let finished_at = now.max(Utc::now());

        if execution.is_completed() {
            item.transition(GoalStatus::Completed, finished_at)?;
            self.save_item(&item)?;
            info!(goal_id, plan_id = %plan.plan_id, "goal completed");
            self.events.publish(Event::GoalCompleted {
                goal_id: goal_id.to_string(),
                plan_id: plan.plan_id.clone(),
            });
            return Ok(DispatchOutcome::Completed {
                goal_id: goal_id.to_string(),
                execution: Box::new(execution),
            });
        }

        let reason = execution
            .failure_message()
            .unwrap_or_else(|| "plan execution failed".into());
        item.fail(reason.clone(), finished_at)?;
        self.save_item(&item)?;
        warn!(goal_id, plan_id = %plan.plan_id, %reason, "goal failed");
        self.events.publish(Event::GoalFailed {
            goal_id: goal_id.to_string(),
            reason: reason.clone(),
        });
        Ok(DispatchOutcome::Failed {
            goal_id: goal_id.to_string(),
            reason,
            execution: Some(Box::new(execution)),
        })
    }

    fn record_dispatch_error(&self, goal_id: &str, message: &str, now: DateTime<Utc>) -> Result<()> {
        let mut item = self.load_item(goal_id)?;
        if item.status.is_terminal() {
            return Ok(());
        }
        item.fail(message, now.max(Utc::now()))?;
        self.save_item(&item)?;
        self.events.publish(Event::GoalFailed {
            goal_id: goal_id.to_string(),
            reason: message.to_string(),
        });
        Ok(())
    }

    // ── Read surface and direct planning ───────────────────────

    /// The newest `limit` records of each collection plus the pointer.
    pub fn list_goal_manager_state(&self, limit: Option<usize>) -> Result<GoalManagerState> {
        let limit = limit.unwrap_or(self.settings.state_list_limit);
        let pointer = self.store.get_pointer(ACTIVE_GOAL_POINTER)?;
        let queue_depth = self.load_open_queue()?.len();

        Ok(GoalManagerState {
            active_since: pointer.value.as_ref().and(pointer.updated_at),
            active_goal_id: pointer.value,
            queue_depth,
            queue: decode_all(
                Collection::QueueItems,
                self.store.list(Collection::QueueItems, Some(limit))?,
            ),
            candidates: decode_all(
                Collection::Candidates,
                self.store.list(Collection::Candidates, Some(limit))?,
            ),
            suppressions: decode_all(
                Collection::Suppressions,
                self.store.list(Collection::Suppressions, Some(limit))?,
            ),
        })
    }

    pub async fn build_goal_plan(&self, goal_text: &str, dry_run: bool) -> GoalPlan {
        self.planner.build_goal_plan(goal_text, dry_run).await
    }

    /// Plan with explicit write permission, for direct operator runs.
    pub async fn build_plan(&self, request: &PlanRequest) -> GoalPlan {
        self.planner.build(request).await
    }

    pub async fn execute_goal_plan(
        &self,
        plan: &GoalPlan,
        options: &ExecutePlanOptions,
    ) -> PlanExecutionResult {
        self.executor.execute_goal_plan(plan, options).await
    }
}
