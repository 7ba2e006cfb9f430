//! # warden-store
//!
//! Durable state for the goal manager. Three append/upsert collections keyed
//! by stable ids:
//!
//! - **Candidates**: every generated goal candidate, scored or suppressed.
//! - **Queue items**: admitted goals, keyed by `goal_id`.
//! - **Suppressions**: append-only audit of suppressed candidates.
//!
//! plus named scalar pointers (the active-goal id) updated by compare-and-set,
//! so single-flight dispatch holds across processes sharing one database.

pub mod memory;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;
pub use store::{ACTIVE_GOAL_POINTER, Collection, PointerRecord, StateStore};
