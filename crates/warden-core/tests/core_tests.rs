#[cfg(test)]
mod tests {
    use warden_core::*;

    // ── Type tests ─────────────────────────────────────────────

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_risk_parse() {
        assert_eq!(RiskLevel::parse("HIGH"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse(" critical "), Some(RiskLevel::Critical));
        assert_eq!(RiskLevel::parse("severe"), None);
    }

    #[test]
    fn test_intent_serde_uses_kebab_names() {
        let json = serde_json::to_string(&GoalIntent::CostOptimize).unwrap();
        assert_eq!(json, "\"cost-optimize\"");
        let restored: GoalIntent = serde_json::from_str("\"stabilize\"").unwrap();
        assert_eq!(restored, GoalIntent::Stabilize);
    }

    #[test]
    fn test_intent_parse_accepts_underscores() {
        assert_eq!(GoalIntent::parse("cost_optimize"), Some(GoalIntent::CostOptimize));
        assert_eq!(GoalIntent::parse("Recover"), Some(GoalIntent::Recover));
        assert_eq!(GoalIntent::parse("deploy"), None);
    }

    #[test]
    fn test_intent_requires_execution() {
        assert!(GoalIntent::Stabilize.requires_execution());
        assert!(GoalIntent::Recover.requires_execution());
        assert!(GoalIntent::CostOptimize.requires_execution());
        assert!(!GoalIntent::Investigate.requires_execution());
        assert!(!GoalIntent::Custom.requires_execution());
    }

    #[test]
    fn test_signal_source_order() {
        let names: Vec<&str> = SignalSource::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["metrics", "anomalies", "failover", "cost", "memory", "policy"]
        );
    }

    #[test]
    fn test_vcpu_tiers() {
        assert_eq!(next_tier_up(2), Some(4));
        assert_eq!(next_tier_up(8), None);
        assert_eq!(next_tier_down(4), Some(2));
        assert_eq!(next_tier_down(1), None);
        assert_eq!(memory_gib_for_vcpu(4), 8);
    }

    #[test]
    fn test_initiator_automatic() {
        assert!(Initiator::Scheduler.is_automatic());
        assert!(!Initiator::Operator.is_automatic());
        assert!(!Initiator::Tool.is_automatic());
    }

    // ── Hash tests ─────────────────────────────────────────────

    #[test]
    fn test_stable_hash_is_deterministic() {
        assert_eq!(stable_hash(&["a", "b"]), stable_hash(&["a", "b"]));
        assert_ne!(stable_hash(&["ab", "c"]), stable_hash(&["a", "bc"]));
    }

    #[test]
    fn test_stable_id_prefix_and_length() {
        let id = stable_id("goal", &["x"]);
        assert!(id.starts_with("goal-"));
        assert_eq!(id.len(), "goal-".len() + 24);
    }

    #[test]
    fn test_normalize_goal_text() {
        assert_eq!(
            normalize_goal_text("  Scale   UP the\tsequencer \n"),
            "scale up the sequencer"
        );
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123_456), 0.1235);
        assert_eq!(round4(2.0), 2.0);
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_display() {
        let err = WardenError::InvalidTransition {
            goal_id: "goal-1".into(),
            from: "completed".into(),
            to: "running".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("goal-1"));
        assert!(msg.contains("completed -> running"));
    }

    #[test]
    fn test_collaborator_shorthand() {
        let err = WardenError::collaborator("scaler", "timeout");
        assert!(matches!(err, WardenError::Collaborator { .. }));
        assert!(err.to_string().contains("scaler"));
    }

    #[test]
    fn test_error_from_serde() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: WardenError = bad.unwrap_err().into();
        assert!(matches!(err, WardenError::Serialization(_)));
    }

    // ── Event bus tests ────────────────────────────────────────

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(Event::GoalQueued {
            goal_id: "goal-1".into(),
            score: 70,
        });
        match rx.recv().await.unwrap() {
            Event::GoalQueued { goal_id, score } => {
                assert_eq!(goal_id, "goal-1");
                assert_eq!(score, 70);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers_ok() {
        let bus = EventBus::default();
        bus.publish(Event::Shutdown);
    }

    #[test]
    fn test_event_serde_tagged() {
        let json = serde_json::to_value(Event::GoalExpired {
            goal_id: "goal-9".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "goal_expired");
    }

    // ── Simulated environment ──────────────────────────────────

    mod sim {
        use warden_core::ops::*;
        use warden_core::sim::{SimulatedEnvironment, WorldState};

        #[tokio::test]
        async fn test_failing_source_errors() {
            let env = SimulatedEnvironment::new(WorldState::default());
            env.fail_source("metrics");
            assert!(env.get_recent_metrics(5).await.is_err());
            env.heal_source("metrics");
            assert!(env.get_recent_metrics(5).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_scale_updates_tier_and_cooldown() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let outcome = env.scale(4, 8, false).await.unwrap();
            assert_eq!(outcome.previous_vcpu, 2);
            assert_eq!(outcome.current_vcpu, 4);
            let state = env.get_scaling_state().await.unwrap();
            assert_eq!(state.current_vcpu, 4);
            assert_eq!(state.cooldown_remaining_secs, 300);
        }

        #[tokio::test]
        async fn test_dry_run_scale_changes_nothing() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let outcome = env.scale(8, 16, true).await.unwrap();
            assert!(outcome.dry_run);
            assert_eq!(env.snapshot().scaling.current_vcpu, 2);
        }

        #[tokio::test]
        async fn test_stuck_scaler() {
            let env = SimulatedEnvironment::new(WorldState {
                stuck_vcpu: Some(2),
                ..Default::default()
            });
            let outcome = env.scale(4, 8, false).await.unwrap();
            assert_eq!(outcome.current_vcpu, 2);
        }

        #[tokio::test]
        async fn test_switch_endpoint_without_target_picks_alternative() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let switch = env.switch_endpoint(None).await.unwrap();
            assert_eq!(switch.previous_url.as_deref(), Some("https://rpc-primary.internal"));
            assert_eq!(switch.active_url, "https://rpc-secondary.internal");
        }

        #[tokio::test]
        async fn test_health_check_action() {
            let env = SimulatedEnvironment::new(WorldState::default());
            let out = env
                .execute(&OpsAction::new("health_check", serde_json::json!({})))
                .await
                .unwrap();
            assert_eq!(out.status, ActionStatus::Success);
            assert!(out.output.unwrap().contains("healthy"));
        }

        #[test]
        fn test_world_state_partial_json() {
            let state: WorldState =
                serde_json::from_str(r#"{"scaling": {"current_vcpu": 4, "cooldown_remaining_secs": 0, "auto_scaling_enabled": false}}"#)
                    .unwrap();
            assert_eq!(state.scaling.current_vcpu, 4);
            assert_eq!(state.endpoints.len(), 2);
        }
    }
}
