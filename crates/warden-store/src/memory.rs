use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use crate::store::{Collection, PointerRecord, StateStore};
use warden_core::Result;

#[derive(Default)]
struct Records {
    order: Vec<String>,
    by_id: HashMap<String, Value>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<Collection, Records>,
    pointers: HashMap<String, (Option<String>, DateTime<Utc>)>,
}

/// Process-local [`StateStore`]. Same semantics as the SQLite store, nothing survives a restart.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<Inner>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn upsert(&self, collection: Collection, id: &str, value: &Value) -> Result<()> {
        let mut inner = self.inner.lock();
        let records = inner.collections.entry(collection).or_default();
        if records.by_id.insert(id.to_string(), value.clone()).is_none() {
            records.order.push(id.to_string());
        }
        Ok(())
    }

    fn insert_if_absent(&self, collection: Collection, id: &str, value: &Value) -> Result<bool> {
        let mut inner = self.inner.lock();
        let records = inner.collections.entry(collection).or_default();
        if records.by_id.contains_key(id) {
            return Ok(false);
        }
        records.by_id.insert(id.to_string(), value.clone());
        records.order.push(id.to_string());
        Ok(true)
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(&collection)
            .and_then(|r| r.by_id.get(id).cloned()))
    }

    fn list(&self, collection: Collection, limit: Option<usize>) -> Result<Vec<Value>> {
        let inner = self.inner.lock();
        let Some(records) = inner.collections.get(&collection) else {
            return Ok(Vec::new());
        };
        let skip = limit
            .map(|l| records.order.len().saturating_sub(l))
            .unwrap_or(0);
        Ok(records
            .order
            .iter()
            .skip(skip)
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect())
    }

    fn list_by_status(&self, collection: Collection, statuses: &[&str]) -> Result<Vec<Value>> {
        let inner = self.inner.lock();
        let Some(records) = inner.collections.get(&collection) else {
            return Ok(Vec::new());
        };
        Ok(records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id))
            .filter(|value| {
                value
                    .get("status")
                    .and_then(Value::as_str)
                    .is_some_and(|s| statuses.contains(&s))
            })
            .cloned()
            .collect())
    }

    fn get_pointer(&self, key: &str) -> Result<PointerRecord> {
        let inner = self.inner.lock();
        let (value, updated_at) = match inner.pointers.get(key) {
            Some((value, at)) => (value.clone(), Some(*at)),
            None => (None, None),
        };
        Ok(PointerRecord {
            key: key.to_string(),
            value,
            updated_at,
        })
    }

    fn compare_and_set_pointer(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();
        let current = inner.pointers.get(key).and_then(|(v, _)| v.as_deref());
        if current != expected {
            return Ok(false);
        }
        inner
            .pointers
            .insert(key.to_string(), (new.map(str::to_string), now));
        Ok(true)
    }
}
