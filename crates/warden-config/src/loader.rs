use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use warden_core::{Result, WardenError};

use crate::schema::WardenConfig;

/// Loads and optionally hot-reloads the Warden configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<WardenConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Wrap an already-built config (tests, embedded use).
    pub fn from_config(config: WardenConfig) -> Result<Self> {
        Self::check(&config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: PathBuf::from("warden.toml"),
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> WardenConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<WardenConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn read_file(path: &Path) -> Result<WardenConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<WardenConfig>(&raw).map_err(|e| {
            WardenError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    // Logs warnings, fails on errors.
    fn check(config: &WardenConfig) -> Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(WardenError::Config(e)),
        }
    }

    fn env_flag(name: &str) -> Option<bool> {
        let v = std::env::var(name).ok()?;
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                warn!(var = name, value = %v, "ignoring unparseable boolean override");
                None
            }
        }
    }

    /// Apply env var overrides (WARDEN_AGENT_MODEL, WARDEN_AUTONOMY_LEVEL, etc.)
    fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_AGENT_MODEL") {
            config.agent.model = v;
        }
        if let Ok(v) = std::env::var("WARDEN_AUTONOMY_LEVEL")
            && let Ok(level) = v.parse::<u8>()
        {
            config.autonomy.level = level;
        }
        if let Some(flag) = Self::env_flag("WARDEN_READ_ONLY") {
            config.autonomy.read_only_mode = flag;
        }
        if let Some(flag) = Self::env_flag("WARDEN_DISPATCH_ENABLED") {
            config.goal_manager.dispatch_enabled = flag;
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_DB_PATH") {
            config.store.db_path = PathBuf::from(v);
        }
        // API keys: config file takes priority, env is the fallback.
        if config.services.anthropic_api_key.is_none()
            && let Ok(v) = std::env::var("ANTHROPIC_API_KEY")
        {
            config.services.anthropic_api_key = Some(v);
        }
        if config.services.openai_api_key.is_none()
            && let Ok(v) = std::env::var("OPENAI_API_KEY")
        {
            config.services.openai_api_key = Some(v);
        }
        config
    }

    /// Reload the config from disk. An invalid file leaves the current config in place.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(WardenError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read_file(&self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that reloads when the config file changes.
    /// The returned watcher must be kept alive for watching to continue.
    pub fn watch(&self) -> Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<NotifyEvent, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "file watcher error");
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                let is_our_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == path_for_event.file_name());
                if !is_our_file {
                    return;
                }

                info!("config file changed, reloading");
                match ConfigLoader::read_file(&path_for_event) {
                    Ok(new_config) => {
                        let new_config = ConfigLoader::apply_env_overrides(new_config);
                        if let Err(e) = new_config.validate() {
                            warn!(error = %e, "config file has errors, keeping current config");
                            return;
                        }
                        *config.write() = new_config;
                        info!("configuration hot-reloaded successfully");
                    }
                    Err(e) => {
                        warn!(error = %e, "config file has errors, keeping current config");
                    }
                }
            })
            .map_err(|e| WardenError::Config(format!("failed to create file watcher: {}", e)))?;

        // Watch the parent directory (editors often write a temp file and rename)
        let watch_path = self
            .config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| WardenError::Config(format!("failed to watch config directory: {}", e)))?;

        Ok(watcher)
    }
}
