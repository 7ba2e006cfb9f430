//! # warden-core
//!
//! Core types, traits, and primitives for the Warden operations control plane.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace, including the narrow contracts through which the control plane
//! talks to metrics stores, anomaly detectors, scalers and RPC operators.

pub mod error;
pub mod event;
pub mod hash;
pub mod ops;
pub mod sim;
pub mod types;

pub use error::{Result, WardenError};
pub use event::{Event, EventBus};
pub use hash::{normalize_goal_text, round4, stable_hash, stable_id};
pub use sim::{SimulatedEnvironment, WorldState};
pub use types::*;
