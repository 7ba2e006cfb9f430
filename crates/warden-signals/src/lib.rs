//! # warden-signals
//!
//! Gathers state from the six signal sources into one immutable
//! [`SignalSnapshot`]. Sources are fetched concurrently, each under its own
//! timeout; a failing source degrades to a safe default and is listed in
//! `degraded_sources` instead of failing the snapshot.

pub mod collector;
pub mod snapshot;
pub mod trend;

pub use collector::{SignalCollector, SignalSources, SignalWindows};
pub use snapshot::{
    AnomalySignal, CostSignal, FailoverSignal, GoalPlannerRuntimeContext, MemorySignal,
    MetricsSignal, PolicySignal, SignalSnapshot,
};
pub use trend::{Trend, classify_trend};
