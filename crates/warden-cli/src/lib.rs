//! # warden-cli
//!
//! Command-line interface for the Warden control plane.
//!
//! ## Commands
//!
//! - `warden tick` : collect signals and enqueue admitted goals
//! - `warden dispatch` : run the top queued goal
//! - `warden state` : show queue, candidates and suppressions
//! - `warden plan` : plan (and optionally execute) a free-text goal
//! - `warden run` : periodic tick and dispatch loops until Ctrl+C
//! - `warden config` / `warden doctor` : inspect and audit configuration
//!
//! Collaborators are served by a [`warden_core::sim::SimulatedEnvironment`]
//! loaded from `--world <file.json>`.

pub mod commands;
pub mod context;

pub use commands::Cli;
pub use context::ControlPlane;
