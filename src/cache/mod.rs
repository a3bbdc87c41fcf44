//! Time-bucketed groupBy cache
//!
//! - [`interval`]: split query intervals into day and hour buckets
//! - [`addressing`]: lookup conditions and fingerprints for one bucket
//! - [`persistence`]: the stored row shape and its text encoding
//! - [`store`], [`sqlite`]: cache store capabilities and backends
//! - [`orchestrator`]: answer a query bucket by bucket

pub mod addressing;
mod error;
pub mod interval;
pub mod orchestrator;
pub mod persistence;
pub mod sqlite;
pub mod store;

pub use addressing::{
    aggregations_fingerprint, canonical_json, filter_fingerprint, fingerprint,
    post_aggregations_fingerprint, query_fingerprint, CacheAddress, ADDRESS_COLUMNS,
};
pub use error::{CacheError, CacheResult, IntervalError};
pub use interval::{decompose, decompose_all, decompose_slot, IntervalSlot};
pub use orchestrator::{BucketSource, BucketedQuery, MergeAccumulator};
pub use persistence::{bucket_timestamp, PersistenceRow};
pub use sqlite::SqliteGroupByStore;
pub use store::{GroupByCacheStore, MemoryGroupByStore, MemoryResultCache, ResultCache};
