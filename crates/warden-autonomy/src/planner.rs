//! Goal planner: turns goal text into a validated [`GoalPlan`], preferring the
//! model and falling back to per-intent rule templates, with bounded re-planning.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use warden_config::WardenConfig;
use warden_core::{GoalIntent, next_tier_down, next_tier_up};
use warden_llm::{ChatRequest, ModelRouter, ModelTier, extract_json_object};
use warden_signals::{GoalPlannerRuntimeContext, SignalCollector, SignalWindows};

use crate::plan::*;
use crate::validator::{
    CandidateStep, GoalPlanCandidate, PlanValidation, ValidationContext,
    validate_goal_plan_candidate,
};

const PLANNER_SYSTEM_PROMPT: &str = "You are the planning module of an L2 infrastructure \
operations agent. Turn the operator goal into a short ordered plan of typed steps. \
Respond with a single strict JSON object and nothing else: no prose, no markdown.";

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub llm_enabled: bool,
    pub max_replan_attempts: u32,
    pub read_only_mode: bool,
}

impl PlannerSettings {
    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            llm_enabled: config.goal_manager.llm_planner_enabled,
            max_replan_attempts: config.goal_manager.max_replan_attempts,
            read_only_mode: config.autonomy.read_only_mode,
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::from_config(&WardenConfig::default())
    }
}

/// What to plan for.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub goal: String,
    /// Inferred from the goal text when absent.
    pub intent: Option<GoalIntent>,
    pub dry_run: bool,
    pub allow_writes: bool,
}

impl PlanRequest {
    pub fn new(goal: impl Into<String>, dry_run: bool) -> Self {
        Self {
            goal: goal.into(),
            intent: None,
            dry_run,
            allow_writes: false,
        }
    }
}

pub struct GoalPlanner {
    router: Arc<ModelRouter>,
    collector: Arc<SignalCollector>,
    windows: SignalWindows,
    settings: PlannerSettings,
}

struct Proposal {
    candidate: GoalPlanCandidate,
    source: PlanSource,
    fallback_reason: Option<&'static str>,
}

impl GoalPlanner {
    pub fn new(
        router: Arc<ModelRouter>,
        collector: Arc<SignalCollector>,
        windows: SignalWindows,
        settings: PlannerSettings,
    ) -> Self {
        Self {
            router,
            collector,
            windows,
            settings,
        }
    }

    /// Plan `goal_text` without write permission.
    pub async fn build_goal_plan(&self, goal_text: &str, dry_run: bool) -> GoalPlan {
        self.build(&PlanRequest::new(goal_text, dry_run)).await
    }

    pub async fn build(&self, request: &PlanRequest) -> GoalPlan {
        let runtime = self.collector.runtime_context(&self.windows).await;
        self.build_with_context(request, runtime).await
    }

    /// Plan against an already collected runtime context.
    pub async fn build_with_context(
        &self,
        request: &PlanRequest,
        runtime: GoalPlannerRuntimeContext,
    ) -> GoalPlan {
        let intent = request.intent.unwrap_or_else(|| infer_intent(&request.goal));
        let ctx = ValidationContext {
            dry_run: request.dry_run,
            allow_writes: request.allow_writes,
            read_only_mode: self.settings.read_only_mode,
            runtime,
        };
        let max_attempts = 1 + self.settings.max_replan_attempts;
        let mut previous_issues = Vec::new();
        let mut last_code = ValidationCode::SchemaInvalid;
        let mut last_fallback = None;

        for attempt in 1..=max_attempts {
            let proposal = self
                .propose(request, intent, &ctx.runtime, &previous_issues)
                .await;
            last_fallback = proposal.fallback_reason.or(last_fallback);

            match validate_goal_plan_candidate(&proposal.candidate, &ctx) {
                PlanValidation::Valid { steps } => {
                    let plan = GoalPlan {
                        plan_id: Uuid::new_v4().to_string(),
                        goal: request.goal.clone(),
                        intent: proposal
                            .candidate
                            .intent
                            .as_deref()
                            .and_then(GoalIntent::parse)
                            .unwrap_or(intent),
                        summary: proposal
                            .candidate
                            .summary
                            .filter(|s| !s.trim().is_empty())
                            .unwrap_or_else(|| format!("{} plan: {}", intent, request.goal)),
                        dry_run: request.dry_run,
                        status: PlanStatus::Planned,
                        steps,
                        source: proposal.source,
                        attempts: attempt,
                        llm_fallback_reason: last_fallback.map(str::to_string),
                        failure: None,
                        issues: Vec::new(),
                        created_at: Utc::now(),
                    };
                    info!(
                        plan_id = %plan.plan_id,
                        intent = %plan.intent,
                        steps = plan.steps.len(),
                        attempt,
                        source = ?plan.source,
                        "goal plan accepted"
                    );
                    return plan;
                }
                PlanValidation::Invalid {
                    reason_code,
                    issues,
                } => {
                    warn!(
                        attempt,
                        max_attempts,
                        reason_code = %reason_code,
                        issues = issues.len(),
                        "goal plan rejected by validator"
                    );
                    last_code = reason_code;
                    previous_issues = issues;
                }
            }
        }

        let message = previous_issues
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "plan validation failed".into());
        warn!(code = %last_code, %message, "planning budget exhausted");
        GoalPlan {
            plan_id: Uuid::new_v4().to_string(),
            goal: request.goal.clone(),
            intent,
            summary: format!("planning failed after {max_attempts} attempts"),
            dry_run: request.dry_run,
            status: PlanStatus::Failed,
            steps: Vec::new(),
            source: PlanSource::Rule,
            attempts: max_attempts,
            llm_fallback_reason: last_fallback.map(str::to_string),
            failure: Some(PlanFailure {
                code: last_code.as_str().to_string(),
                message,
            }),
            issues: previous_issues,
            created_at: Utc::now(),
        }
    }

    async fn propose(
        &self,
        request: &PlanRequest,
        intent: GoalIntent,
        runtime: &GoalPlannerRuntimeContext,
        previous_issues: &[ValidationIssue],
    ) -> Proposal {
        let rule = |fallback_reason| Proposal {
            candidate: rule_template(intent, runtime),
            source: PlanSource::Rule,
            fallback_reason,
        };
        if !self.settings.llm_enabled {
            return rule(None);
        }
        if !self.router.has_providers() {
            return rule(Some("no_ai_provider_key"));
        }

        let chat = ChatRequest {
            system_prompt: PLANNER_SYSTEM_PROMPT.to_string(),
            user_prompt: planner_prompt(request, intent, runtime, previous_issues),
            model_tier: ModelTier::Best,
        };
        let reply = match self.router.chat_completion(&chat).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "planner model unavailable, using rule template");
                return rule(Some("llm_unavailable"));
            }
        };
        let parsed = extract_json_object(&reply.content).and_then(|value| {
            serde_json::from_value::<GoalPlanCandidate>(value).map_err(Into::into)
        });
        match parsed {
            Ok(candidate) => Proposal {
                candidate,
                source: PlanSource::Llm,
                fallback_reason: None,
            },
            Err(e) => {
                warn!(error = %e, model = %reply.model, "unparseable plan from model, using rule template");
                rule(Some("llm_parse_error"))
            }
        }
    }
}

fn planner_prompt(
    request: &PlanRequest,
    intent: GoalIntent,
    runtime: &GoalPlannerRuntimeContext,
    previous_issues: &[ValidationIssue],
) -> String {
    let mut prompt = format!(
        "Goal: {goal}\nIntent: {intent}\nDry run: {dry_run}\nWrites allowed: {writes}\n\
         Runtime: {runtime}\n\n\
         Allowed actions: collect_state, inspect_anomalies, run_rca (read); \
         scale_execution, restart_execution, set_routing_policy (write).\n\
         scale_execution parameters: {{\"targetVcpu\": one of 1, 2, 4, 8}}. No scaling while \
         cooldown is active; no downscale while anomalies are active.\n\
         set_routing_policy parameters: {{\"policyName\": one of primary_only, round_robin, \
         latency_weighted, failover_priority}}, optional \"targetUrl\".\n\
         At most {max} steps.\n\n\
         Respond with: {{\"intent\": \"...\", \"summary\": \"...\", \"steps\": [{{\"title\": \"...\", \
         \"action\": \"...\", \"reason\": \"...\", \"risk\": \"low|medium|high|critical\", \
         \"parameters\": {{}}}}]}}",
        goal = request.goal,
        dry_run = request.dry_run,
        writes = request.allow_writes,
        runtime = json!(runtime),
        max = MAX_PLAN_STEPS,
    );
    if !previous_issues.is_empty() {
        prompt.push_str("\n\nPrevious validation issues (fix all of them):\n");
        for issue in previous_issues {
            prompt.push_str(&format!("- {issue}\n"));
        }
    }
    prompt
}

/// Keyword intent inference for free-form goal text.
pub fn infer_intent(goal: &str) -> GoalIntent {
    let text = goal.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
    if has(&["investigat", "root cause", "rca", "diagnos"]) {
        GoalIntent::Investigate
    } else if has(&["cost", "saving", "over-provision", "overprovision", "scale down", "downscale"]) {
        GoalIntent::CostOptimize
    } else if has(&["failover", "recover", "restore", "rpc", "endpoint", "outage"]) {
        GoalIntent::Recover
    } else if has(&["stabil", "anomal", "cpu", "load", "pressure", "scale up", "latency"]) {
        GoalIntent::Stabilize
    } else {
        GoalIntent::Custom
    }
}

/// Deterministic plan for `intent` given live state.
pub fn rule_template(intent: GoalIntent, runtime: &GoalPlannerRuntimeContext) -> GoalPlanCandidate {
    let collect = || CandidateStep::new(PlanAction::CollectState, "capture current state", json!({}));
    let inspect = || {
        CandidateStep::new(
            PlanAction::InspectAnomalies,
            "review active anomaly events",
            json!({}),
        )
    };
    let rca = |reason: &str| CandidateStep::new(PlanAction::RunRca, reason, json!({}));

    let steps = match intent {
        GoalIntent::Stabilize => {
            let scale = match next_tier_up(runtime.current_vcpu) {
                Some(target) if runtime.cooldown_remaining_secs == 0 => CandidateStep {
                    rollback_hint: Some(format!("scale back to {} vCPU", runtime.current_vcpu)),
                    ..CandidateStep::new(
                        PlanAction::ScaleExecution,
                        "add headroom under rising load",
                        json!({ "targetVcpu": target }),
                    )
                },
                _ => rca("scaling unavailable (max tier or cooldown), analyse instead"),
            };
            vec![collect(), inspect(), scale, collect()]
        }
        GoalIntent::Recover => vec![
            collect(),
            rca("find the cause of repeated RPC failovers"),
            CandidateStep::new(
                PlanAction::SetRoutingPolicy,
                "route traffic to the healthiest endpoint",
                json!({ "policyName": "failover_priority" }),
            ),
        ],
        GoalIntent::CostOptimize => {
            let settled = runtime.active_anomaly_count == 0 && runtime.cooldown_remaining_secs == 0;
            let scale = match next_tier_down(runtime.current_vcpu) {
                Some(target) if settled => CandidateStep {
                    rollback_hint: Some(format!("scale back to {} vCPU", runtime.current_vcpu)),
                    ..CandidateStep::new(
                        PlanAction::ScaleExecution,
                        "release unused capacity",
                        json!({ "targetVcpu": target }),
                    )
                },
                _ => rca("downscale unavailable (min tier, cooldown or active anomalies), analyse instead"),
            };
            vec![collect(), scale]
        }
        GoalIntent::Investigate | GoalIntent::Custom => {
            vec![collect(), inspect(), rca("explain the current signals")]
        }
    };

    GoalPlanCandidate {
        intent: Some(intent.as_str().to_string()),
        summary: None,
        steps,
    }
}
