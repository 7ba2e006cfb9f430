#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use warden_autonomy::*;
    use warden_core::sim::{SimulatedEnvironment, WorldState};
    use warden_core::{GoalIntent, Initiator, RiskLevel};
    use warden_signals::GoalPlannerRuntimeContext;

    fn runtime(current_vcpu: u32, cooldown: u64, anomalies: usize) -> GoalPlannerRuntimeContext {
        GoalPlannerRuntimeContext {
            latest_cpu_usage: Some(70.0),
            active_anomaly_count: anomalies,
            current_vcpu,
            cooldown_remaining_secs: cooldown,
        }
    }

    // ── Autonomy Levels ────────────────────────────────────────

    mod level {
        use super::*;

        #[test]
        fn test_from_u8() {
            assert_eq!(AutonomyLevel::from_u8(0), AutonomyLevel::A0);
            assert_eq!(AutonomyLevel::from_u8(3), AutonomyLevel::A3);
            assert_eq!(AutonomyLevel::from_u8(5), AutonomyLevel::A5);
            // Out of range clamps to A1
            assert_eq!(AutonomyLevel::from_u8(6), AutonomyLevel::A1);
            assert_eq!(AutonomyLevel::from_u8(255), AutonomyLevel::A1);
        }

        #[test]
        fn test_default_and_display() {
            assert_eq!(AutonomyLevel::default(), AutonomyLevel::A2);
            assert_eq!(AutonomyLevel::A4.to_string(), "A4");
            assert!(AutonomyLevel::A1.is_manual());
            assert!(!AutonomyLevel::A2.is_manual());
            assert!(!AutonomyLevel::A2.allows_writes());
        }
    }

    // ── Policy Engine ──────────────────────────────────────────

    mod policy {
        use super::*;

        fn input(level: AutonomyLevel, risk: RiskLevel) -> PolicyInput {
            PolicyInput {
                level,
                read_only_mode: false,
                min_confidence_write: 0.75,
                min_confidence_dry_run: 0.5,
                auto_execute: false,
                allow_writes: true,
                dry_run: false,
                risk,
                confidence: None,
            }
        }

        #[test]
        fn test_read_only_blocks_automatic_writes() {
            let d = evaluate_goal_execution_policy(&PolicyInput {
                read_only_mode: true,
                auto_execute: true,
                ..input(AutonomyLevel::A5, RiskLevel::Low)
            });
            assert!(d.is_denied());
            assert_eq!(d.reason_code, "read_only_mode");
        }

        #[test]
        fn test_manual_levels_deny_automatic_execution() {
            for level in [AutonomyLevel::A0, AutonomyLevel::A1] {
                let d = evaluate_goal_execution_policy(&PolicyInput {
                    auto_execute: true,
                    allow_writes: false,
                    dry_run: true,
                    ..input(level, RiskLevel::Low)
                });
                assert!(d.is_denied());
                assert_eq!(d.reason_code, "autonomy_level_manual");
            }
        }

        #[test]
        fn test_a2_with_writes_always_denies() {
            for dry_run in [true, false] {
                for risk in [RiskLevel::Low, RiskLevel::Critical] {
                    let d = evaluate_goal_execution_policy(&PolicyInput {
                        dry_run,
                        ..input(AutonomyLevel::A2, risk)
                    });
                    assert!(d.is_denied());
                    assert_eq!(d.reason_code, "autonomy_level_dry_run_only");
                }
            }
            let dry = evaluate_goal_execution_policy(&PolicyInput {
                allow_writes: false,
                dry_run: true,
                auto_execute: true,
                ..input(AutonomyLevel::A2, RiskLevel::High)
            });
            assert!(dry.is_allowed());
        }

        #[test]
        fn test_confidence_thresholds() {
            let write = evaluate_goal_execution_policy(&PolicyInput {
                confidence: Some(0.7),
                ..input(AutonomyLevel::A5, RiskLevel::Low)
            });
            assert!(write.is_denied());
            assert_eq!(write.reason_code, "low_confidence");

            // The same confidence clears the dry-run bar
            let dry = evaluate_goal_execution_policy(&PolicyInput {
                confidence: Some(0.7),
                dry_run: true,
                ..input(AutonomyLevel::A5, RiskLevel::Low)
            });
            assert!(dry.is_allowed());

            let too_low = evaluate_goal_execution_policy(&PolicyInput {
                confidence: Some(0.4),
                dry_run: true,
                ..input(AutonomyLevel::A5, RiskLevel::Low)
            });
            assert!(too_low.is_denied());
        }

        #[test]
        fn test_risk_based_approval_narrows_with_level() {
            let needs = |level, risk| {
                evaluate_goal_execution_policy(&input(level, risk)).requires_approval()
            };
            assert!(!needs(AutonomyLevel::A3, RiskLevel::Low));
            assert!(needs(AutonomyLevel::A3, RiskLevel::Medium));
            assert!(!needs(AutonomyLevel::A4, RiskLevel::Medium));
            assert!(needs(AutonomyLevel::A4, RiskLevel::High));
            assert!(needs(AutonomyLevel::A4, RiskLevel::Critical));
        }

        #[test]
        fn test_a5_only_critical_needs_approval() {
            for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
                let d = evaluate_goal_execution_policy(&input(AutonomyLevel::A5, risk));
                assert!(d.is_allowed(), "{risk} should be allowed at A5");
            }
            let d = evaluate_goal_execution_policy(&input(AutonomyLevel::A5, RiskLevel::Critical));
            assert!(d.requires_approval());
            assert_eq!(d.reason_code, "approval_required");
        }

        #[test]
        fn test_operator_writes_at_manual_levels_need_approval() {
            let d = evaluate_goal_execution_policy(&input(AutonomyLevel::A1, RiskLevel::Low));
            assert!(d.requires_approval());
            let read = evaluate_goal_execution_policy(&PolicyInput {
                allow_writes: false,
                dry_run: true,
                ..input(AutonomyLevel::A0, RiskLevel::Low)
            });
            assert!(read.is_allowed());
        }

        #[test]
        fn test_settings_from_config() {
            let settings = PolicySettings::default();
            assert_eq!(settings.level, AutonomyLevel::A2);
            assert!(settings.read_only_mode);
            let d = settings.evaluate(Initiator::Scheduler, false, true, RiskLevel::High, Some(0.9));
            assert!(d.is_allowed());
        }
    }

    // ── Plan Validator ─────────────────────────────────────────

    mod validator {
        use super::*;

        fn ctx(runtime: GoalPlannerRuntimeContext) -> ValidationContext {
            ValidationContext {
                dry_run: true,
                allow_writes: false,
                read_only_mode: true,
                runtime,
            }
        }

        fn scale(target: serde_json::Value) -> GoalPlanCandidate {
            GoalPlanCandidate {
                steps: vec![CandidateStep::new(
                    PlanAction::ScaleExecution,
                    "scale",
                    json!({ "targetVcpu": target }),
                )],
                ..Default::default()
            }
        }

        fn code(v: &PlanValidation) -> Option<ValidationCode> {
            match v {
                PlanValidation::Valid { .. } => None,
                PlanValidation::Invalid { reason_code, .. } => Some(*reason_code),
            }
        }

        #[test]
        fn test_target_vcpu_outside_tiers_is_schema_invalid() {
            for bad in [json!(3), json!(16), json!("four"), json!(null)] {
                let v = validate_goal_plan_candidate(&scale(bad), &ctx(runtime(2, 0, 0)));
                assert_eq!(code(&v), Some(ValidationCode::SchemaInvalid));
            }
        }

        #[test]
        fn test_downscale_with_active_anomalies_rejected() {
            let v = validate_goal_plan_candidate(&scale(json!(2)), &ctx(runtime(4, 0, 1)));
            assert_eq!(code(&v), Some(ValidationCode::RuntimePreconditionFailed));
            // Upscale with anomalies is fine
            let v = validate_goal_plan_candidate(&scale(json!(8)), &ctx(runtime(4, 0, 1)));
            assert!(v.is_valid());
        }

        #[test]
        fn test_cooldown_blocks_tier_change_only() {
            let v = validate_goal_plan_candidate(&scale(json!(4)), &ctx(runtime(2, 120, 0)));
            assert_eq!(code(&v), Some(ValidationCode::RuntimePreconditionFailed));
            let v = validate_goal_plan_candidate(&scale(json!(2)), &ctx(runtime(2, 120, 0)));
            assert!(v.is_valid());
        }

        #[test]
        fn test_blank_step_text_is_normalized() {
            let candidate = GoalPlanCandidate {
                steps: vec![CandidateStep {
                    title: Some("   ".into()),
                    reason: Some("  look first  ".into()),
                    rollback_hint: Some(String::new()),
                    ..CandidateStep::new(PlanAction::CollectState, "", json!({}))
                }],
                ..Default::default()
            };
            match validate_goal_plan_candidate(&candidate, &ctx(runtime(2, 0, 0))) {
                PlanValidation::Valid { steps, .. } => {
                    assert_eq!(steps[0].title, PlanAction::CollectState.default_title());
                    assert_eq!(steps[0].reason, "look first");
                    assert!(steps[0].rollback_hint.is_none());
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_write_steps_forced_to_require_approval() {
            let candidate = GoalPlanCandidate {
                steps: vec![CandidateStep {
                    risk: Some("low".into()),
                    requires_approval: Some(false),
                    ..CandidateStep::new(PlanAction::RestartExecution, "restart", json!({}))
                }],
                ..Default::default()
            };
            let PlanValidation::Valid { steps } =
                validate_goal_plan_candidate(&candidate, &ctx(runtime(2, 0, 0)))
            else {
                panic!("expected valid plan");
            };
            assert!(steps[0].requires_approval);
            assert_eq!(steps[0].risk, RiskLevel::High);
            assert_eq!(steps[0].status, StepStatus::Pending);
        }

        #[test]
        fn test_unknown_action() {
            let candidate = GoalPlanCandidate {
                steps: vec![CandidateStep {
                    action: "delete_database".into(),
                    ..Default::default()
                }],
                ..Default::default()
            };
            let v = validate_goal_plan_candidate(&candidate, &ctx(runtime(2, 0, 0)));
            assert_eq!(code(&v), Some(ValidationCode::InvalidStepAction));
            assert_eq!(v.issues()[0].step_index, Some(0));
        }

        #[test]
        fn test_routing_policy_name_checked() {
            let step = |name: &str| GoalPlanCandidate {
                steps: vec![CandidateStep::new(
                    PlanAction::SetRoutingPolicy,
                    "route",
                    json!({ "policyName": name }),
                )],
                ..Default::default()
            };
            let v = validate_goal_plan_candidate(&step("random"), &ctx(runtime(2, 0, 0)));
            assert_eq!(code(&v), Some(ValidationCode::SchemaInvalid));
            let v = validate_goal_plan_candidate(&step("latency_weighted"), &ctx(runtime(2, 0, 0)));
            assert!(v.is_valid());
        }

        #[test]
        fn test_step_count_bounds() {
            let v = validate_goal_plan_candidate(&GoalPlanCandidate::default(), &ctx(runtime(2, 0, 0)));
            assert_eq!(code(&v), Some(ValidationCode::SchemaInvalid));

            let many = GoalPlanCandidate {
                steps: (0..13)
                    .map(|_| CandidateStep::new(PlanAction::CollectState, "look", json!({})))
                    .collect(),
                ..Default::default()
            };
            let v = validate_goal_plan_candidate(&many, &ctx(runtime(2, 0, 0)));
            assert_eq!(code(&v), Some(ValidationCode::SchemaInvalid));
        }

        #[test]
        fn test_non_dry_run_without_writes_is_policy_violation() {
            let candidate = GoalPlanCandidate {
                steps: vec![CandidateStep::new(PlanAction::CollectState, "look", json!({}))],
                ..Default::default()
            };
            let v = validate_goal_plan_candidate(
                &candidate,
                &ValidationContext {
                    dry_run: false,
                    ..ctx(runtime(2, 0, 0))
                },
            );
            assert_eq!(code(&v), Some(ValidationCode::PolicyViolation));
        }

        #[test]
        fn test_write_step_in_read_only_with_writes_is_policy_violation() {
            let v = validate_goal_plan_candidate(
                &scale(json!(4)),
                &ValidationContext {
                    allow_writes: true,
                    ..ctx(runtime(2, 0, 0))
                },
            );
            assert_eq!(code(&v), Some(ValidationCode::PolicyViolation));
        }

        #[test]
        fn test_parameters_must_be_object() {
            let candidate = GoalPlanCandidate {
                steps: vec![CandidateStep::new(PlanAction::RunRca, "why", json!([1, 2]))],
                ..Default::default()
            };
            let v = validate_goal_plan_candidate(&candidate, &ctx(runtime(2, 0, 0)));
            assert_eq!(code(&v), Some(ValidationCode::SchemaInvalid));
        }

        #[test]
        fn test_candidate_parses_camel_case_json() {
            let raw = json!({
                "intent": "stabilize",
                "steps": [
                    {"action": "scale_execution", "requiresApproval": false,
                     "parameters": {"targetVcpu": 4}, "rollbackHint": "go back"}
                ]
            });
            let candidate: GoalPlanCandidate = serde_json::from_value(raw).unwrap();
            assert_eq!(candidate.steps[0].requires_approval, Some(false));
            assert_eq!(candidate.steps[0].rollback_hint.as_deref(), Some("go back"));
        }
    }

    // ── Goal Planner ───────────────────────────────────────────

    mod planner {
        use super::*;
        use warden_llm::mock::{MockProvider, MockResponse};
        use warden_llm::{ModelRouter, RouterSettings};
        use warden_signals::{SignalCollector, SignalSources, SignalWindows};

        fn router(mock: Option<MockProvider>) -> ModelRouter {
            let mut router = ModelRouter::new(RouterSettings {
                best_model: "mock/test-model".into(),
                retry_base_delay: Duration::from_millis(1),
                ..Default::default()
            });
            if let Some(mock) = mock {
                router.add_provider(Arc::new(mock));
            }
            router
        }

        fn planner(env: &SimulatedEnvironment, router: ModelRouter, llm: bool) -> GoalPlanner {
            let collector = SignalCollector::new(
                SignalSources::from_shared(Arc::new(env.clone())),
                "optimism",
                false,
            );
            GoalPlanner::new(
                Arc::new(router),
                Arc::new(collector),
                SignalWindows::default(),
                PlannerSettings {
                    llm_enabled: llm,
                    max_replan_attempts: 2,
                    read_only_mode: false,
                },
            )
        }

        #[test]
        fn test_infer_intent() {
            assert_eq!(infer_intent("Investigate the gas spike"), GoalIntent::Investigate);
            assert_eq!(infer_intent("Reduce cost of idle capacity"), GoalIntent::CostOptimize);
            assert_eq!(infer_intent("Recover from RPC failover storm"), GoalIntent::Recover);
            assert_eq!(infer_intent("Stabilize CPU pressure"), GoalIntent::Stabilize);
            assert_eq!(infer_intent("Say hello"), GoalIntent::Custom);
        }

        #[test]
        fn test_rule_template_respects_runtime() {
            let up = rule_template(GoalIntent::Stabilize, &runtime(2, 0, 1));
            assert_eq!(up.steps[2].action, "scale_execution");
            assert_eq!(up.steps[2].parameters["targetVcpu"], 4);

            let cooling = rule_template(GoalIntent::Stabilize, &runtime(2, 60, 1));
            assert_eq!(cooling.steps[2].action, "run_rca");

            let at_max = rule_template(GoalIntent::Stabilize, &runtime(8, 0, 0));
            assert_eq!(at_max.steps[2].action, "run_rca");

            let down = rule_template(GoalIntent::CostOptimize, &runtime(4, 0, 0));
            assert_eq!(down.steps[1].parameters["targetVcpu"], 2);
            let busy = rule_template(GoalIntent::CostOptimize, &runtime(4, 0, 2));
            assert_eq!(busy.steps[1].action, "run_rca");
            let cooling_down = rule_template(GoalIntent::CostOptimize, &runtime(4, 120, 0));
            assert_eq!(cooling_down.steps[1].action, "run_rca");

            let recover = rule_template(GoalIntent::Recover, &runtime(2, 0, 0));
            assert_eq!(recover.steps[2].parameters["policyName"], "failover_priority");
        }

        #[tokio::test]
        async fn test_rule_plan_without_provider() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let plan = planner(&env, router(None), true)
                .build_goal_plan("Stabilize CPU pressure", true)
                .await;
            assert_eq!(plan.status, PlanStatus::Planned);
            assert_eq!(plan.source, PlanSource::Rule);
            assert_eq!(plan.intent, GoalIntent::Stabilize);
            assert_eq!(plan.llm_fallback_reason.as_deref(), Some("no_ai_provider_key"));
            let scale = plan.write_steps().next().unwrap();
            assert_eq!(scale.action, PlanAction::ScaleExecution);
            assert!(scale.requires_approval);
        }

        #[tokio::test]
        async fn test_llm_disabled_reports_no_reason() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let plan = planner(&env, router(None), false)
                .build_goal_plan("look around", true)
                .await;
            assert_eq!(plan.source, PlanSource::Rule);
            assert!(plan.llm_fallback_reason.is_none());
        }

        #[tokio::test]
        async fn test_llm_plan_accepted() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let reply = r#"```json
{"intent":"investigate","summary":"check things","steps":[
  {"title":"Look","action":"collect_state","reason":"baseline","risk":"low","parameters":{}},
  {"action":"run_rca","parameters":{}}
]}
```"#;
            let mock = MockProvider::new("mock").with_response(reply);
            let plan = planner(&env, router(Some(mock)), true)
                .build_goal_plan("why is gas high", true)
                .await;
            assert_eq!(plan.source, PlanSource::Llm);
            assert_eq!(plan.summary, "check things");
            assert_eq!(plan.steps.len(), 2);
            assert_eq!(plan.steps[1].title, "Run root-cause analysis");
            assert_eq!(plan.attempts, 1);
        }

        #[tokio::test]
        async fn test_llm_error_falls_back_to_rule() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let mock = MockProvider::new("mock").with_error("Invalid API key");
            let plan = planner(&env, router(Some(mock)), true)
                .build_goal_plan("investigate", true)
                .await;
            assert_eq!(plan.source, PlanSource::Rule);
            assert_eq!(plan.llm_fallback_reason.as_deref(), Some("llm_unavailable"));
        }

        #[tokio::test]
        async fn test_llm_garbage_falls_back_to_rule() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let mock = MockProvider::new("mock").with_response("I think you should scale up.");
            let plan = planner(&env, router(Some(mock)), true)
                .build_goal_plan("investigate", true)
                .await;
            assert_eq!(plan.source, PlanSource::Rule);
            assert_eq!(plan.llm_fallback_reason.as_deref(), Some("llm_parse_error"));
        }

        #[tokio::test]
        async fn test_replans_with_previous_issues() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let mock = MockProvider::new("mock");
            mock.queue_response(MockResponse::text(
                r#"{"steps":[{"action":"scale_execution","parameters":{"targetVcpu":3}}]}"#,
            ));
            mock.queue_response(MockResponse::text(
                r#"{"steps":[{"action":"scale_execution","parameters":{"targetVcpu":4}}]}"#,
            ));
            let requests = mock.recorded_requests();
            let plan = planner(&env, router(Some(mock)), true)
                .build_goal_plan("Stabilize load", true)
                .await;

            assert_eq!(plan.status, PlanStatus::Planned);
            assert_eq!(plan.attempts, 2);
            assert_eq!(plan.steps[0].param_u32("targetVcpu"), Some(4));
            let recorded = requests.lock();
            assert_eq!(recorded.len(), 2);
            assert!(!recorded[0].prompt.contains("Previous validation issues"));
            assert!(recorded[1].prompt.contains("Previous validation issues"));
            assert!(recorded[1].prompt.contains("schema_invalid"));
        }

        #[tokio::test]
        async fn test_exhausted_budget_yields_failed_plan() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let mock = MockProvider::new("mock");
            for _ in 0..3 {
                mock.queue_response(MockResponse::text(
                    r#"{"steps":[{"action":"launch_rockets"}]}"#,
                ));
            }
            let plan = planner(&env, router(Some(mock)), true)
                .build_goal_plan("do something", true)
                .await;
            assert_eq!(plan.status, PlanStatus::Failed);
            assert!(plan.steps.is_empty());
            assert!(!plan.is_executable());
            assert_eq!(plan.attempts, 3);
            assert_eq!(plan.failure.as_ref().unwrap().code, "invalid_step_action");
            assert!(!plan.issues.is_empty());
        }

        #[tokio::test]
        async fn test_cost_plan_during_cooldown_is_planned() {
            let env = SimulatedEnvironment::new(WorldState {
                scaling: warden_core::ops::ScalingState {
                    current_vcpu: 4,
                    cooldown_remaining_secs: 120,
                    auto_scaling_enabled: true,
                },
                ..Default::default()
            });
            let plan = planner(&env, router(None), false)
                .build(&PlanRequest {
                    goal: "Reduce idle capacity cost".into(),
                    intent: Some(GoalIntent::CostOptimize),
                    dry_run: true,
                    allow_writes: true,
                })
                .await;
            assert_eq!(plan.status, PlanStatus::Planned, "{:?}", plan.failure);
            assert_eq!(plan.attempts, 1);
            assert!(plan.write_steps().next().is_none());
            assert!(plan.steps.iter().any(|s| s.action == PlanAction::RunRca));
        }

        #[tokio::test]
        async fn test_write_plan_in_read_only_fails() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let collector = SignalCollector::new(
                SignalSources::from_shared(Arc::new(env.clone())),
                "optimism",
                true,
            );
            let planner = GoalPlanner::new(
                Arc::new(router(None)),
                Arc::new(collector),
                SignalWindows::default(),
                PlannerSettings {
                    llm_enabled: false,
                    max_replan_attempts: 0,
                    read_only_mode: true,
                },
            );
            let plan = planner
                .build(&PlanRequest {
                    goal: "Stabilize".into(),
                    intent: Some(GoalIntent::Stabilize),
                    dry_run: false,
                    allow_writes: true,
                })
                .await;
            assert_eq!(plan.status, PlanStatus::Failed);
            assert_eq!(plan.failure.unwrap().code, "policy_violation");
        }
    }

    // ── Executor / Verifier / Rollback ─────────────────────────

    mod executor {
        use super::*;
        use chrono::Utc;

        fn step(action: PlanAction, risk: RiskLevel, parameters: serde_json::Value) -> GoalPlanStep {
            GoalPlanStep {
                id: format!("step-{}", action.as_str()),
                title: action.default_title().into(),
                action,
                reason: "test".into(),
                risk,
                requires_approval: action.is_write(),
                parameters,
                preconditions: vec![],
                rollback_hint: None,
                status: StepStatus::Pending,
            }
        }

        fn plan(steps: Vec<GoalPlanStep>) -> GoalPlan {
            GoalPlan {
                plan_id: "plan-test".into(),
                goal: "test".into(),
                intent: GoalIntent::Stabilize,
                summary: "test".into(),
                dry_run: false,
                status: PlanStatus::Planned,
                steps,
                source: PlanSource::Rule,
                attempts: 1,
                llm_fallback_reason: None,
                failure: None,
                issues: vec![],
                created_at: Utc::now(),
            }
        }

        fn scale_plan(target: u32) -> GoalPlan {
            plan(vec![
                step(PlanAction::CollectState, RiskLevel::Low, json!({})),
                step(PlanAction::ScaleExecution, RiskLevel::Medium, json!({ "targetVcpu": target })),
                step(PlanAction::CollectState, RiskLevel::Low, json!({})),
            ])
        }

        fn executor(env: &SimulatedEnvironment, level: AutonomyLevel) -> PlanExecutor {
            PlanExecutor::new(
                OpsCollaborators::from_shared(Arc::new(env.clone())),
                PolicySettings {
                    level,
                    read_only_mode: false,
                    ..Default::default()
                },
            )
        }

        fn write_run() -> ExecutePlanOptions {
            ExecutePlanOptions {
                dry_run: false,
                allow_writes: true,
                initiated_by: Initiator::Operator,
                approved: false,
                confidence: None,
            }
        }

        #[test]
        fn test_health_output() {
            assert!(health_output_is_ok("execution client healthy"));
            assert!(health_output_is_ok("READY"));
            assert!(!health_output_is_ok("not ready"));
            assert!(!health_output_is_ok("healthcheck failed"));
            assert!(!health_output_is_ok("starting"));
            assert!(!health_output_is_ok("execution client unhealthy"));
            assert!(!health_output_is_ok("connection broken"));
            assert!(!health_output_is_ok("peer sync failing, status ok"));
            assert!(health_output_is_ok("status: OK (synced)"));
        }

        #[tokio::test]
        async fn test_unhealthy_restart_fails_verification() {
            let env = SimulatedEnvironment::new(WorldState {
                health_output: "execution client unhealthy".into(),
                ..Default::default()
            });
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(
                    &plan(vec![step(PlanAction::RestartExecution, RiskLevel::High, json!({}))]),
                    &write_run(),
                )
                .await;
            assert!(!result.is_completed());
            let verification = result.log[0].verification.as_ref().unwrap();
            assert!(!verification.passed);
        }

        #[tokio::test]
        async fn test_dry_run_touches_nothing() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let options = ExecutePlanOptions {
                allow_writes: true,
                ..Default::default()
            };
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(&scale_plan(4), &options)
                .await;
            assert!(result.is_completed());
            assert!(env.scale_calls.read().is_empty());
            let verification = result.log[1].verification.as_ref().unwrap();
            assert!(verification.passed);
            assert_eq!(env.snapshot().scaling.current_vcpu, 2);
        }

        #[tokio::test]
        async fn test_writes_disabled_skip_write_steps() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(&scale_plan(4), &ExecutePlanOptions::default())
                .await;
            assert!(result.is_completed());
            assert_eq!(result.plan.steps[1].status, StepStatus::Skipped);
            assert_eq!(result.plan.steps[2].status, StepStatus::Completed);
            assert!(env.scale_calls.read().is_empty());
        }

        #[tokio::test]
        async fn test_verified_scale() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(&scale_plan(4), &write_run())
                .await;
            assert!(result.is_completed(), "{:?}", result.failure_message());
            assert_eq!(env.snapshot().scaling.current_vcpu, 4);
            assert_eq!(
                result.log[1].record,
                Some(OperationRecord::Scale {
                    target_vcpu: 4,
                    previous_vcpu: 2,
                    observed_vcpu: 4
                })
            );
            assert!(result.plan.steps.iter().all(|s| s.status == StepStatus::Completed));
        }

        #[tokio::test]
        async fn test_failed_verification_rolls_back() {
            let env = SimulatedEnvironment::new(WorldState {
                stuck_vcpu: Some(2),
                ..Default::default()
            });
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(&scale_plan(4), &write_run())
                .await;

            assert!(!result.is_completed());
            let entry = &result.log[1];
            assert_eq!(entry.status, StepStatus::Failed);
            assert!(!entry.verification.as_ref().unwrap().passed);
            let rollback = entry.rollback.as_ref().unwrap();
            assert!(rollback.attempted);
            assert!(rollback.success);
            assert_eq!(*env.scale_calls.read(), vec![(4, false), (2, false)]);
            // Plan stops after the failed step
            assert_eq!(result.plan.steps[2].status, StepStatus::Skipped);
            assert!(result.failure_message().unwrap().contains("verification failed"));
        }

        #[test]
        fn test_rollback_plans() {
            let scale = build_rollback_plan(&OperationRecord::Scale {
                target_vcpu: 4,
                previous_vcpu: 2,
                observed_vcpu: 2,
            });
            assert!(scale.available);
            assert_eq!(scale.params.unwrap()["targetVcpu"], 2);

            let restart = build_rollback_plan(&OperationRecord::Restart {
                health_output: None,
            });
            assert!(!restart.available);

            let backend = build_rollback_plan(&OperationRecord::BackendUpdate {
                name: "archive".into(),
                requested_url: "https://b".into(),
                previous_url: Some("https://a".into()),
                current_url: "https://b".into(),
            });
            assert_eq!(backend.action_type.as_deref(), Some("update_backend"));
        }

        #[tokio::test]
        async fn test_unhealthy_restart_has_no_rollback() {
            let env = SimulatedEnvironment::new(WorldState {
                health_output: "execution client not ready".into(),
                ..Default::default()
            });
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(
                    &plan(vec![step(PlanAction::RestartExecution, RiskLevel::High, json!({}))]),
                    &write_run(),
                )
                .await;
            assert!(!result.is_completed());
            let rollback = result.log[0].rollback.as_ref().unwrap();
            assert!(!rollback.attempted);
            assert!(!rollback.success);
        }

        #[tokio::test]
        async fn test_unreachable_endpoint_switch_rolls_back() {
            let env = SimulatedEnvironment::new(WorldState {
                unreachable_endpoints: vec!["https://rpc-secondary.internal".into()],
                ..Default::default()
            });
            let routing = step(
                PlanAction::SetRoutingPolicy,
                RiskLevel::Medium,
                json!({ "policyName": "primary_only", "targetUrl": "https://rpc-secondary.internal" }),
            );
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(&plan(vec![routing]), &write_run())
                .await;
            let entry = &result.log[0];
            assert_eq!(entry.status, StepStatus::Failed);
            assert!(entry.rollback.as_ref().unwrap().success);
            assert_eq!(env.snapshot().active_endpoint, "https://rpc-primary.internal");
        }

        #[tokio::test]
        async fn test_endpoint_switch_to_any_healthy() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let routing = step(
                PlanAction::SetRoutingPolicy,
                RiskLevel::Medium,
                json!({ "policyName": "failover_priority" }),
            );
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(&plan(vec![routing]), &write_run())
                .await;
            assert!(result.is_completed());
            assert_eq!(env.snapshot().active_endpoint, "https://rpc-secondary.internal");
        }

        #[tokio::test]
        async fn test_policy_denial_skips_remaining_steps() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let result = executor(&env, AutonomyLevel::A2)
                .execute_goal_plan(&scale_plan(4), &write_run())
                .await;
            assert!(!result.is_completed());
            assert_eq!(result.plan.steps[0].status, StepStatus::Completed);
            assert_eq!(result.plan.steps[1].status, StepStatus::Skipped);
            assert_eq!(result.plan.steps[2].status, StepStatus::Skipped);
            assert!(env.scale_calls.read().is_empty());
            assert!(
                result
                    .failure_message()
                    .unwrap()
                    .contains("autonomy_level_dry_run_only")
            );
        }

        #[tokio::test]
        async fn test_approval_gate_per_step() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let exec = executor(&env, AutonomyLevel::A3);
            let blocked = exec.execute_goal_plan(&scale_plan(4), &write_run()).await;
            assert!(!blocked.is_completed());
            assert!(env.scale_calls.read().is_empty());

            let approved = exec
                .execute_goal_plan(
                    &scale_plan(4),
                    &ExecutePlanOptions {
                        approved: true,
                        ..write_run()
                    },
                )
                .await;
            assert!(approved.is_completed());
            assert_eq!(env.snapshot().scaling.current_vcpu, 4);
        }

        #[tokio::test]
        async fn test_failed_read_step_fails_plan() {
            let env = SimulatedEnvironment::new(WorldState {
                failing_actions: vec!["collect_state".into()],
                ..Default::default()
            });
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(&scale_plan(4), &write_run())
                .await;
            assert!(!result.is_completed());
            assert_eq!(result.plan.steps[0].status, StepStatus::Failed);
            assert_eq!(result.plan.steps[1].status, StepStatus::Skipped);
            assert!(env.scale_calls.read().is_empty());
        }

        #[tokio::test]
        async fn test_unexecutable_plan() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let mut failed = plan(vec![]);
            failed.status = PlanStatus::Failed;
            failed.failure = Some(PlanFailure {
                code: "schema_invalid".into(),
                message: "no steps".into(),
            });
            let result = executor(&env, AutonomyLevel::A5)
                .execute_goal_plan(&failed, &write_run())
                .await;
            assert!(!result.is_completed());
            assert!(result.log.is_empty());
            assert_eq!(result.failure_message().unwrap(), "schema_invalid: no steps");
        }
    }
}
