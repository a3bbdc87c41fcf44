//! SQLite-backed groupBy cache store
//!
//! Rows are kept in their text encoding, one table row per cached result
//! row. `target` plays the role of the table name, so one database file can
//! hold caches for several datasets.

use crate::cache::addressing::BUCKET_START;
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::persistence::PersistenceRow;
use crate::cache::store::{bucket_key, GroupByCacheStore};
use crate::query::{matches_all, Condition, ConditionOp};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// [`GroupByCacheStore`] persisted in a SQLite database
pub struct SqliteGroupByStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteGroupByStore {
    /// Create or open a cache database at `path`
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// A private in-memory database
    pub fn in_memory() -> CacheResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> CacheResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS group_by_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target TEXT NOT NULL,
                bucket_key TEXT NOT NULL,
                bucket_start INTEGER NOT NULL,
                expires_at INTEGER,
                row TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_target_bucket
             ON group_by_cache(target, bucket_start)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_target_key
             ON group_by_cache(target, bucket_key)",
            [],
        )?;

        if let Some(path) = &path {
            info!(path = %path.display(), "Opened groupBy cache database");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        F: FnOnce(&mut Connection) -> CacheResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| CacheError::Store("connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| CacheError::Store(e.to_string()))?
    }

    /// Live rows of `target` as (id, text row) pairs
    fn load(
        conn: &Connection,
        target: &str,
        bucket_start: Option<i64>,
    ) -> CacheResult<Vec<(i64, BTreeMap<String, String>)>> {
        let now = Utc::now().timestamp_millis();
        let mut stmt = conn.prepare_cached(
            "SELECT id, row FROM group_by_cache
             WHERE target = ?1
               AND (?2 IS NULL OR bucket_start = ?2)
               AND (expires_at IS NULL OR expires_at > ?3)
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![target, bucket_start, now], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut loaded = Vec::new();
        for row in rows {
            let (id, text) = row?;
            let decoded: BTreeMap<String, String> = serde_json::from_str(&text)
                .map_err(|e| CacheError::Corrupt(format!("row {}: {}", id, e)))?;
            loaded.push((id, decoded));
        }
        Ok(loaded)
    }

    /// Count of stored rows for `target`, expired ones included
    pub async fn stored_rows(&self, target: &str) -> CacheResult<usize> {
        let target = target.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM group_by_cache WHERE target = ?1",
                params![target],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    /// Drop expired rows across all targets
    pub async fn purge_expired(&self) -> CacheResult<usize> {
        self.with_conn(|conn| {
            let now = Utc::now().timestamp_millis();
            let removed = conn.execute(
                "DELETE FROM group_by_cache WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            Ok(removed)
        })
        .await
    }
}

/// Bucket start named by an equality condition, used to narrow the scan
fn bucket_start_hint(conditions: &[Condition]) -> Option<i64> {
    conditions
        .iter()
        .find(|c| c.field_name == BUCKET_START && c.op == ConditionOp::Eq)
        .and_then(|c| match &c.value {
            serde_json::Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        })
}

fn matching(
    rows: Vec<(i64, BTreeMap<String, String>)>,
    conditions: &[Condition],
) -> Vec<(i64, BTreeMap<String, String>)> {
    rows.into_iter()
        .filter(|(_, text)| matches_all(conditions, |field| text.get(field).map(String::as_str)))
        .collect()
}

#[async_trait]
impl GroupByCacheStore for SqliteGroupByStore {
    async fn select(
        &self,
        target: &str,
        conditions: &[Condition],
    ) -> CacheResult<Vec<PersistenceRow>> {
        let target = target.to_string();
        let conditions = conditions.to_vec();
        self.with_conn(move |conn| {
            let rows = Self::load(conn, &target, bucket_start_hint(&conditions))?;
            matching(rows, &conditions)
                .iter()
                .map(|(_, text)| PersistenceRow::from_cache_row(text))
                .collect()
        })
        .await
    }

    async fn insert_batch(
        &self,
        target: &str,
        rows: Vec<PersistenceRow>,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let mut encoded = Vec::with_capacity(rows.len());
        for row in &rows {
            row.validate()?;
            let text = row.to_cache_row()?;
            let key = serde_json::to_string(&bucket_key(&text))
                .map_err(|e| CacheError::Corrupt(e.to_string()))?;
            let body =
                serde_json::to_string(&text).map_err(|e| CacheError::Corrupt(e.to_string()))?;
            encoded.push((key, row.bucket_start, body));
        }

        let expires_at = ttl.map(|ttl| Utc::now().timestamp_millis() + ttl.as_millis() as i64);
        let target = target.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut replaced = 0;
            {
                let mut delete = tx.prepare_cached(
                    "DELETE FROM group_by_cache WHERE target = ?1 AND bucket_key = ?2",
                )?;
                let mut keys: Vec<&String> = encoded.iter().map(|(key, _, _)| key).collect();
                keys.dedup();
                for key in keys {
                    replaced += delete.execute(params![target, key])?;
                }

                let mut insert = tx.prepare_cached(
                    "INSERT INTO group_by_cache (target, bucket_key, bucket_start, expires_at, row)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (key, bucket_start, body) in &encoded {
                    insert.execute(params![target, key, bucket_start, expires_at, body])?;
                }
            }
            tx.commit()?;

            debug!(
                cache_target = %target,
                inserted = encoded.len(),
                replaced,
                "Stored bucket rows"
            );
            Ok(())
        })
        .await
    }

    async fn delete(&self, target: &str, conditions: &[Condition]) -> CacheResult<usize> {
        let target = target.to_string();
        let conditions = conditions.to_vec();
        self.with_conn(move |conn| {
            let rows = Self::load(conn, &target, bucket_start_hint(&conditions))?;
            let doomed = matching(rows, &conditions);

            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM group_by_cache WHERE id = ?1")?;
                for (id, _) in &doomed {
                    stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(doomed.len())
        })
        .await
    }

    async fn clean(&self, target: &str) -> CacheResult<()> {
        let target = target.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM group_by_cache WHERE target = ?1",
                params![target],
            )?;
            info!(cache_target = %target, removed, "Cleaned cache target");
            Ok(())
        })
        .await
    }
}
