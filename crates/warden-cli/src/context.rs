//! Wiring shared by every command: tracing, the model router, the state
//! store and the simulated environment behind the collaborator contracts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use warden_autonomy::OpsCollaborators;
use warden_config::WardenConfig;
use warden_core::sim::{SimulatedEnvironment, WorldState};
use warden_core::{EventBus, Result};
use warden_goals::GoalManager;
use warden_llm::{ModelRouter, RouterSettings};
use warden_signals::SignalSources;
use warden_store::{SqliteStateStore, StateStore};

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

/// Register a provider for every configured key. Config keys already carry
/// the `ANTHROPIC_API_KEY` / `OPENAI_API_KEY` env fallback from the loader.
pub fn build_router(config: &WardenConfig) -> ModelRouter {
    let mut router = ModelRouter::new(RouterSettings {
        best_model: config.agent.model.clone(),
        fast_model: config.agent.fast_model.clone(),
        fallback_model: config.agent.fallback_model.clone(),
        max_tokens: config.agent.max_tokens,
        temperature: config.agent.temperature,
        timeout: Duration::from_secs(config.agent.request_timeout_secs.max(1)),
        ..RouterSettings::default()
    });

    if let Some(key) = config.services.anthropic_api_key.as_ref().filter(|k| !k.is_empty()) {
        router.add_provider(Arc::new(warden_llm::anthropic::AnthropicProvider::new(key.clone())));
    }
    if let Some(key) = config.services.openai_api_key.as_ref().filter(|k| !k.is_empty()) {
        let provider = warden_llm::openai::OpenAiProvider::new(key.clone());
        let provider = match &config.services.openai_base_url {
            Some(url) => provider.with_base_url(url.clone(), "openai".into()),
            None => provider,
        };
        router.add_provider(Arc::new(provider));
    }

    if !router.has_providers() {
        info!("no model provider keys configured, running rule-only");
    }
    router
}

fn load_world(world: Option<&Path>) -> Result<SimulatedEnvironment> {
    match world {
        Some(path) => {
            let env = SimulatedEnvironment::from_json_file(path)?;
            info!(path = %path.display(), "loaded simulated world");
            Ok(env)
        }
        None => {
            warn!("no --world given, using an empty simulated environment");
            Ok(SimulatedEnvironment::new(WorldState::default()))
        }
    }
}

/// Everything a command needs to drive the goal manager.
pub struct ControlPlane {
    pub config: WardenConfig,
    pub env: SimulatedEnvironment,
    pub manager: Arc<GoalManager>,
}

impl ControlPlane {
    pub fn build(config: WardenConfig, world: Option<&Path>) -> Result<Self> {
        if let Some(parent) = config.store.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::open(&config.store.db_path)?);
        Self::with_store(config, world, store)
    }

    pub fn with_store(
        config: WardenConfig,
        world: Option<&Path>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let env = load_world(world)?;
        let shared = Arc::new(env.clone());
        let manager = GoalManager::new(
            &config,
            store,
            SignalSources::from_shared(Arc::clone(&shared)),
            OpsCollaborators::from_shared(shared),
            Arc::new(build_router(&config)),
            EventBus::default(),
        );
        Ok(Self {
            config,
            env,
            manager: Arc::new(manager),
        })
    }

    /// Persist the simulated world back so the next invocation sees the
    /// effects of executed writes (new tier, cooldown, switched endpoint).
    pub fn save_world(&self, world: Option<&Path>) -> Result<()> {
        let Some(path) = world else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.env.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
