//! Cache store capabilities
//!
//! Two independent capability sets back the query layer:
//!
//! - [`ResultCache`]: opaque response bytes keyed by query fingerprint
//! - [`GroupByCacheStore`]: per-bucket [`PersistenceRow`]s grouped under a
//!   target (a table or namespace) and selected by [`Condition`]s
//!
//! Both come with in-memory implementations for tests and single-process use.

use crate::cache::addressing::ADDRESS_COLUMNS;
use crate::cache::error::CacheResult;
use crate::cache::persistence::PersistenceRow;
use crate::query::{matches_all, Condition};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Byte cache for whole query responses
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value`; `ttl` of `None` keeps it until released
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    async fn release(&self, key: &str) -> CacheResult<()>;
}

/// Store of per-bucket groupBy rows
#[async_trait]
pub trait GroupByCacheStore: Send + Sync {
    /// Rows of `target` matching every condition
    async fn select(&self, target: &str, conditions: &[Condition])
        -> CacheResult<Vec<PersistenceRow>>;

    async fn insert(
        &self,
        target: &str,
        row: PersistenceRow,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        self.insert_batch(target, vec![row], ttl).await
    }

    /// Store `rows`, replacing whatever was stored for the same buckets
    async fn insert_batch(
        &self,
        target: &str,
        rows: Vec<PersistenceRow>,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    /// Remove matching rows, returning how many were removed
    async fn delete(&self, target: &str, conditions: &[Condition]) -> CacheResult<usize>;

    /// Remove every row of `target`
    async fn clean(&self, target: &str) -> CacheResult<()>;
}

/// Address column values of a text-encoded row
pub(crate) fn bucket_key(row: &BTreeMap<String, String>) -> Vec<String> {
    ADDRESS_COLUMNS
        .iter()
        .map(|c| row.get(*c).cloned().unwrap_or_default())
        .collect()
}

fn expired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_some_and(|t| t <= now)
}

struct CachedBytes {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// In-process [`ResultCache`]
#[derive(Default)]
pub struct MemoryResultCache {
    entries: RwLock<HashMap<String, CachedBytes>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !expired(entry.expires_at, now) => {
                    return Ok(Some(entry.value.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), CachedBytes { value, expires_at });
        Ok(())
    }

    async fn release(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

struct StoredRow {
    text: BTreeMap<String, String>,
    row: PersistenceRow,
    expires_at: Option<Instant>,
}

/// In-process [`GroupByCacheStore`]
#[derive(Default)]
pub struct MemoryGroupByStore {
    targets: RwLock<HashMap<String, Vec<StoredRow>>>,
}

impl MemoryGroupByStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live rows stored under `target`
    pub async fn row_count(&self, target: &str) -> usize {
        let now = Instant::now();
        self.targets
            .read()
            .await
            .get(target)
            .map(|rows| rows.iter().filter(|r| !expired(r.expires_at, now)).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl GroupByCacheStore for MemoryGroupByStore {
    async fn select(
        &self,
        target: &str,
        conditions: &[Condition],
    ) -> CacheResult<Vec<PersistenceRow>> {
        let now = Instant::now();
        let targets = self.targets.read().await;
        let rows = targets
            .get(target)
            .map(|rows| {
                rows.iter()
                    .filter(|r| !expired(r.expires_at, now))
                    .filter(|r| matches_all(conditions, |field| r.text.get(field).map(String::as_str)))
                    .map(|r| r.row.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn insert_batch(
        &self,
        target: &str,
        rows: Vec<PersistenceRow>,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            row.validate()?;
            stored.push(StoredRow {
                text: row.to_cache_row()?,
                row,
                expires_at,
            });
        }

        let mut targets = self.targets.write().await;
        let existing = targets.entry(target.to_string()).or_default();
        let replaced: Vec<Vec<String>> = stored.iter().map(|s| bucket_key(&s.text)).collect();
        let before = existing.len();
        existing.retain(|r| !replaced.contains(&bucket_key(&r.text)));
        debug!(
            cache_target = target,
            inserted = stored.len(),
            replaced = before - existing.len(),
            "Stored bucket rows"
        );
        existing.extend(stored);
        Ok(())
    }

    async fn delete(&self, target: &str, conditions: &[Condition]) -> CacheResult<usize> {
        let mut targets = self.targets.write().await;
        let Some(rows) = targets.get_mut(target) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !matches_all(conditions, |field| r.text.get(field).map(String::as_str)));
        Ok(before - rows.len())
    }

    async fn clean(&self, target: &str) -> CacheResult<()> {
        self.targets.write().await.remove(target);
        Ok(())
    }
}
