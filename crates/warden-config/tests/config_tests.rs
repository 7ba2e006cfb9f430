#[cfg(test)]
mod tests {
    use std::io::Write;
    use warden_config::ConfigLoader;
    use warden_config::schema::*;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_warden_config_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.agent.model, "anthropic/claude-sonnet-4-20250514");
        assert_eq!(config.agent.request_timeout_secs, 20);
        assert_eq!(config.store.db_path, std::path::PathBuf::from("warden.db"));
    }

    #[test]
    fn test_autonomy_config_defaults() {
        let config = AutonomyConfig::default();
        assert_eq!(config.level, 2);
        assert_eq!(config.min_confidence_write, 0.75);
        assert_eq!(config.min_confidence_dry_run, 0.5);
        assert!(config.read_only_mode);
    }

    #[test]
    fn test_goal_manager_defaults_are_safe() {
        let config = GoalManagerConfig::default();
        assert!(config.enabled);
        assert!(!config.dispatch_enabled);
        assert!(config.dry_run);
        assert!(!config.allow_writes);
        assert_eq!(config.goal_ttl_secs, 3600);
        assert_eq!(config.max_replan_attempts, 2);
        assert_eq!(config.dedup_window_secs, 1800);
    }

    #[test]
    fn test_signals_config_defaults() {
        let config = SignalsConfig::default();
        assert_eq!(config.chain_type, "optimism");
        assert_eq!(config.metrics_samples, 30);
        assert_eq!(config.source_timeout_ms, 5000);
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_default_config_validates() {
        assert!(WardenConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_level_is_error() {
        let mut config = WardenConfig::default();
        config.autonomy.level = 9;
        let err = config.validate().unwrap_err();
        assert!(err.contains("autonomy.level"));
    }

    #[test]
    fn test_level_five_is_warning() {
        let mut config = WardenConfig::default();
        config.autonomy.level = 5;
        let warnings = config.validate().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.field == "autonomy.level" && w.severity == WarningSeverity::Warning));
    }

    #[test]
    fn test_writes_with_dispatch_warns() {
        let mut config = WardenConfig::default();
        config.goal_manager.dispatch_enabled = true;
        config.goal_manager.allow_writes = true;
        config.goal_manager.dry_run = false;
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "goal_manager.allow_writes"));
    }

    #[test]
    fn test_confidence_out_of_range_is_error() {
        let mut config = WardenConfig::default();
        config.autonomy.min_confidence_write = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_source_timeout_is_error() {
        let mut config = WardenConfig::default();
        config.signals.source_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_format_warns() {
        let mut config = WardenConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "logging.format"));
    }

    #[test]
    fn test_warning_display_includes_hint() {
        let w = ConfigWarning {
            field: "autonomy.level".into(),
            message: "bad".into(),
            severity: WarningSeverity::Error,
            hint: Some("use 0-5".into()),
        };
        let s = w.to_string();
        assert!(s.starts_with("[error] autonomy.level: bad"));
        assert!(s.contains("use 0-5"));
    }

    #[test]
    fn test_has_ai_provider_key() {
        let mut services = ServicesConfig::default();
        assert!(!services.has_ai_provider_key());
        services.openai_api_key = Some(String::new());
        assert!(!services.has_ai_provider_key());
        services.openai_api_key = Some("sk-test".into());
        assert!(services.has_ai_provider_key());
    }

    // ── TOML roundtrip tests ───────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = WardenConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: WardenConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.agent.model, config.agent.model);
        assert_eq!(restored.autonomy.level, config.autonomy.level);
        assert_eq!(restored.goal_manager.goal_ttl_secs, config.goal_manager.goal_ttl_secs);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[autonomy]
level = 4
read_only_mode = false

[goal_manager]
dispatch_enabled = true
"#;
        let config: WardenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.autonomy.level, 4);
        assert!(!config.autonomy.read_only_mode);
        assert!(config.goal_manager.dispatch_enabled);
        // Defaults should fill in
        assert_eq!(config.autonomy.min_confidence_write, 0.75);
        assert!(config.goal_manager.dry_run);
        assert_eq!(config.signals.chain_type, "optimism");
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[agent]
model = "openai/gpt-4o"

[goal_manager]
goal_ttl_secs = 600
max_replan_attempts = 1

[signals]
chain_type = "arbitrum"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.goal_manager.goal_ttl_secs, 600);
        assert_eq!(config.goal_manager.max_replan_attempts, 1);
        assert_eq!(config.signals.chain_type, "arbitrum");
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        std::fs::write(&config_path, "[agent]\ntemperature = 9.0\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());
    }

    #[test]
    fn test_config_loader_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        std::fs::write(&config_path, "[agent\nmodel = ").unwrap();
        let err = ConfigLoader::load(Some(config_path.as_path())).err().unwrap();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().goal_manager.goal_ttl_secs, 3600);
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");

        std::fs::write(&config_path, "[goal_manager]\ntick_interval_secs = 30\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().goal_manager.tick_interval_secs, 30);

        std::fs::write(&config_path, "[goal_manager]\ntick_interval_secs = 90\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().goal_manager.tick_interval_secs, 90);
    }

    #[test]
    fn test_reload_keeps_config_on_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");

        std::fs::write(&config_path, "[goal_manager]\ngoal_ttl_secs = 120\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();

        std::fs::write(&config_path, "[goal_manager]\ntick_interval_secs = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().goal_manager.goal_ttl_secs, 120);
    }

    #[test]
    fn test_shared_sees_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("warden.toml");
        std::fs::write(&config_path, "[store]\ndb_path = \"a.db\"\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let shared = loader.shared();

        std::fs::write(&config_path, "[store]\ndb_path = \"b.db\"\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(shared.read().store.db_path, std::path::PathBuf::from("b.db"));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = WardenConfig::default();
        config.autonomy.level = 7;
        assert!(ConfigLoader::from_config(config).is_err());
    }

    // ── JSON roundtrip ─────────────────────────────────────────

    #[test]
    fn test_config_json_roundtrip() {
        let config = WardenConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: WardenConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.agent.model, config.agent.model);
        assert_eq!(restored.goal_manager.dedup_window_secs, 1800);
    }
}
