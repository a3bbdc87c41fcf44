//! Druid query execution
//!
//! [`QueryExecutor`] is the seam between the bucket cache and the broker:
//! [`DruidClient`] talks HTTP, tests plug in in-process executors.

mod druid;
mod error;
mod refresh;

pub use druid::{DruidClient, CACHE_THRESHOLD_BYTES};
pub use error::{ClientError, ClientResult};
pub use refresh::{needs_refresh, RoundRobinUrls, UrlRefresher, URL_REFRESH_PATTERN};

use crate::query::{GroupByQuery, ResultRow};
use async_trait::async_trait;

/// Rows of an executed query together with the bytes they were decoded from
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub rows: Vec<ResultRow>,
    pub raw: Vec<u8>,
}

impl QueryResponse {
    /// Decode a groupBy response body
    pub fn from_raw(raw: Vec<u8>) -> ClientResult<Self> {
        let rows = serde_json::from_slice(&raw)?;
        Ok(Self { rows, raw })
    }
}

/// Runs a groupBy query against a live store
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &GroupByQuery) -> ClientResult<QueryResponse>;
}
