use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_core::Result;

/// Pointer key holding the id of the single running goal.
pub const ACTIVE_GOAL_POINTER: &str = "active_goal_id";

/// Logical collections persisted by the goal manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Candidates,
    QueueItems,
    Suppressions,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidates => "goal_candidates",
            Self::QueueItems => "goal_queue",
            Self::Suppressions => "goal_suppressions",
        }
    }
}

/// Current state of a named pointer. `value` is `None` when the pointer is clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRecord {
    pub key: String,
    pub value: Option<String>,
    /// When the pointer last changed; `None` if it was never written.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A durable key/value store for JSON records plus compare-and-set pointers.
///
/// Every write is keyed by a stable id, so replaying a tick never duplicates
/// records. `list` returns records in first-insertion order; updating a record
/// keeps its original position.
pub trait StateStore: Send + Sync {
    /// Insert or replace the record with this id.
    fn upsert(&self, collection: Collection, id: &str, value: &Value) -> Result<()>;

    /// Insert only when no record with this id exists. Returns whether it was inserted.
    fn insert_if_absent(&self, collection: Collection, id: &str, value: &Value) -> Result<bool>;

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>>;

    /// All records in insertion order, or only the newest `limit` of them.
    fn list(&self, collection: Collection, limit: Option<usize>) -> Result<Vec<Value>>;

    /// Records whose top-level `status` field is one of `statuses`, in insertion order.
    fn list_by_status(&self, collection: Collection, statuses: &[&str]) -> Result<Vec<Value>>;

    fn get_pointer(&self, key: &str) -> Result<PointerRecord>;

    /// Atomically set `key` to `new` if its current value equals `expected`.
    /// Returns `false`, changing nothing, when another writer got there first.
    fn compare_and_set_pointer(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}
