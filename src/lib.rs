//! # druidkit
//!
//! Client-side query layer for Apache Druid with a time-bucketed groupBy
//! result cache.
//!
//! ## Features
//!
//! - **Typed queries**: groupBy queries, filters, aggregations and
//!   post-aggregations in Druid's JSON wire format
//! - **Bucketed caching**: long ranges are split into day and hour buckets,
//!   each served from the cache or queried live
//! - **Reconciliation**: per-bucket results are merge-joined and
//!   post-aggregations recomputed from the merged values
//! - **Stores**: in-memory and SQLite cache backends
//!
//! ## Modules
//!
//! - [`query`]: query DSL, result rows and the predicate matcher
//! - [`merge`]: value algebra and the ordered merge-join
//! - [`cache`]: interval decomposition, addressing, stores, orchestration
//! - [`client`]: HTTP executor for Druid brokers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use druidkit::cache::{BucketedQuery, SqliteGroupByStore};
//! use druidkit::client::DruidClient;
//! use druidkit::config::DruidConfig;
//! use druidkit::query::{Aggregation, GroupByQuery};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = DruidClient::new(&DruidConfig::default())?;
//!     let store = SqliteGroupByStore::open(Path::new("groupby.db"))?;
//!     let bucketed = BucketedQuery::new(Arc::new(client)).with_store(Arc::new(store));
//!
//!     let query = GroupByQuery::builder("events")
//!         .dimension("os")
//!         .aggregation(Aggregation::long_sum("sum", "value"))
//!         .interval("2024-01-01T00:00:00Z/2024-01-08T00:00:00Z")
//!         .build();
//!
//!     // Seven day buckets, each cached after its first query
//!     let result = bucketed.cache_query(&query, Some("events"), true).await?;
//!     println!("Found {} rows", result.result.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
mod error;
pub mod logging;
pub mod merge;
pub mod query;

pub use error::{Error, Result};

pub use cache::{
    decompose, BucketedQuery, CacheAddress, CacheError, GroupByCacheStore, IntervalError,
    IntervalSlot, MemoryGroupByStore, MemoryResultCache, PersistenceRow, ResultCache,
    SqliteGroupByStore,
};

pub use client::{ClientError, DruidClient, QueryExecutor, QueryResponse};

pub use merge::{MergeError, Value};

pub use query::{
    Aggregation, Condition, ConditionOp, Filter, GroupByQuery, PostAggregation, ResultRow,
};

pub use config::{CacheConfig, Config, ConfigError, DruidConfig, LoggingConfig};
