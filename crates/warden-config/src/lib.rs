//! # warden-config
//!
//! Configuration for the Warden control plane. Reads from `warden.toml`, then
//! applies `WARDEN_*` environment overrides on top.
//!
//! Supports hot-reload via filesystem watcher.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::WardenConfig;
pub use schema::{
    AgentConfig, AutonomyConfig, ConfigWarning, GoalManagerConfig, LoggingConfig,
    ServicesConfig, SignalsConfig, StoreConfig, WarningSeverity,
};
