use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::store::{Collection, PointerRecord, StateStore};
use warden_core::{Result, WardenError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn store_err(e: rusqlite::Error) -> WardenError {
    WardenError::Store(e.to_string())
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// SQLite-backed [`StateStore`].
#[derive(Clone)]
pub struct SqliteStateStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Open or create the state database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening state store");

        let conn = Connection::open(path).map_err(store_err)?;

        // WAL lets a dashboard read while the driver writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(store_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(store_err)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(collection, id)
            );

            CREATE TABLE IF NOT EXISTS pointers (
                key TEXT PRIMARY KEY,
                value TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection, seq);
            CREATE INDEX IF NOT EXISTS idx_records_status
                ON records(collection, json_extract(body, '$.status'));
            ",
        )
        .map_err(store_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }
}

impl StateStore for SqliteStateStore {
    fn upsert(&self, collection: Collection, id: &str, value: &Value) -> Result<()> {
        let body = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        self.db
            .lock()
            .execute(
                "INSERT INTO records (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                params![collection.as_str(), id, body, now],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn insert_if_absent(&self, collection: Collection, id: &str, value: &Value) -> Result<bool> {
        let body = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        let rows = self
            .db
            .lock()
            .execute(
                "INSERT OR IGNORE INTO records (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![collection.as_str(), id, body, now],
            )
            .map_err(store_err)?;
        Ok(rows > 0)
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let body: Option<String> = self
            .db
            .lock()
            .query_row(
                "SELECT body FROM records WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        match body {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn list(&self, collection: Collection, limit: Option<usize>) -> Result<Vec<Value>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let bodies: Vec<String> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(
                    "SELECT body FROM (
                        SELECT seq, body FROM records WHERE collection = ?1 ORDER BY seq DESC LIMIT ?2
                     ) ORDER BY seq ASC",
                )
                .map_err(store_err)?;
            stmt.query_map(params![collection.as_str(), limit], |row| row.get(0))
                .map_err(store_err)?
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(store_err)?
        };
        bodies
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(WardenError::from))
            .collect()
    }

    fn list_by_status(&self, collection: Collection, statuses: &[&str]) -> Result<Vec<Value>> {
        let wanted = serde_json::to_string(statuses)?;
        let bodies: Vec<String> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(
                    "SELECT body FROM records
                     WHERE collection = ?1
                       AND json_extract(body, '$.status') IN (SELECT value FROM json_each(?2))
                     ORDER BY seq ASC",
                )
                .map_err(store_err)?;
            stmt.query_map(params![collection.as_str(), wanted], |row| row.get(0))
                .map_err(store_err)?
                .collect::<std::result::Result<Vec<String>, _>>()
                .map_err(store_err)?
        };
        bodies
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(WardenError::from))
            .collect()
    }

    fn get_pointer(&self, key: &str) -> Result<PointerRecord> {
        let row: Option<(Option<String>, String)> = self
            .db
            .lock()
            .query_row(
                "SELECT value, updated_at FROM pointers WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(store_err)?;
        Ok(match row {
            Some((value, updated_at)) => PointerRecord {
                key: key.to_string(),
                value,
                updated_at: parse_ts(&updated_at),
            },
            None => PointerRecord {
                key: key.to_string(),
                value: None,
                updated_at: None,
            },
        })
    }

    fn compare_and_set_pointer(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now = now.to_rfc3339();
        let mut db = self.db.lock();
        let tx = db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_err)?;
        tx.execute(
            "INSERT OR IGNORE INTO pointers (key, value, updated_at) VALUES (?1, NULL, ?2)",
            params![key, now],
        )
        .map_err(store_err)?;
        // `IS` compares NULL as a value, so a clear pointer matches `expected = None`
        let rows = tx
            .execute(
                "UPDATE pointers SET value = ?2, updated_at = ?3 WHERE key = ?1 AND value IS ?4",
                params![key, new, now, expected],
            )
            .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        debug!(key, ?expected, ?new, swapped = rows > 0, "pointer compare-and-set");
        Ok(rows > 0)
    }
}
