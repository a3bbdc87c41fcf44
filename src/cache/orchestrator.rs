//! Bucketed groupBy execution
//!
//! A granularity-`all` groupBy over a long range is answered bucket by
//! bucket: each day or hour bucket is either read back from the
//! [`GroupByCacheStore`] or queried live, and the per-bucket results are
//! merge-joined into one result.

use crate::cache::addressing::CacheAddress;
use crate::cache::error::CacheError;
use crate::cache::interval::{decompose_all, IntervalSlot};
use crate::cache::persistence::PersistenceRow;
use crate::cache::store::GroupByCacheStore;
use crate::client::QueryExecutor;
use crate::merge::{merge_rows, sort_by_dimensions, MergeError, MergeSchema};
use crate::query::{GroupByQuery, ResultRow};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

/// Where a bucket's rows came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketSource {
    Cache,
    Live,
}

/// Running result of a bucketed query
#[derive(Debug)]
pub struct MergeAccumulator {
    schema: MergeSchema,
    rows: Vec<ResultRow>,
    folded: HashSet<(i64, i64)>,
}

impl MergeAccumulator {
    pub fn new(schema: MergeSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            folded: HashSet::new(),
        }
    }

    /// Merge one bucket's dimension-sorted rows into the result
    pub fn fold(mut self, slot: &IntervalSlot, rows: Vec<ResultRow>) -> Result<Self, MergeError> {
        if !self.folded.insert((slot.epoch_start(), slot.duration_seconds)) {
            return Err(MergeError::DuplicateBucket(slot.to_interval()));
        }
        let accumulated = std::mem::take(&mut self.rows);
        self.rows = merge_rows(accumulated, rows, &self.schema)?;
        Ok(self)
    }

    pub fn buckets(&self) -> usize {
        self.folded.len()
    }

    pub fn into_rows(self) -> Vec<ResultRow> {
        self.rows
    }
}

/// Per-call tallies for the summary log line
#[derive(Debug, Default)]
struct BucketStats {
    hits: usize,
    misses: usize,
    written: usize,
}

/// Runs groupBy queries through the bucket cache
pub struct BucketedQuery {
    executor: Arc<dyn QueryExecutor>,
    store: Option<Arc<dyn GroupByCacheStore>>,
    ttl: Option<Duration>,
}

impl BucketedQuery {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            store: None,
            ttl: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn GroupByCacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Lifetime of rows written back to the store
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Execute `query`, serving buckets from the cache where possible.
    ///
    /// Without a store or a target, or when the query carries a `limitSpec`
    /// or `having` clause, the query is executed once as is. With
    /// `writeback`, buckets fetched live are stored, and a failed store
    /// write fails the call.
    pub async fn cache_query(
        &self,
        query: &GroupByQuery,
        target: Option<&str>,
        writeback: bool,
    ) -> crate::Result<GroupByQuery> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("cache_query", %request_id, data_source = %query.data_source);

        async move {
            let (store, target) = match (&self.store, target) {
                (Some(store), Some(target)) => (store, target),
                _ => {
                    debug!("No cache store or target, executing query directly");
                    return self.pass_through(query).await;
                }
            };
            // both act on the whole result; per-bucket rows would be cut before merging
            if query.limit_spec.is_some() || query.having.is_some() {
                debug!("Query has limitSpec or having, executing query directly");
                return self.pass_through(query).await;
            }
            self.bucketed(query, store.as_ref(), target, writeback).await
        }
        .instrument(span)
        .await
    }

    async fn pass_through(&self, query: &GroupByQuery) -> crate::Result<GroupByQuery> {
        let response = self.executor.execute(query).await?;
        let mut result = query.with_intervals(query.intervals.clone());
        result.result = response.rows;
        Ok(result)
    }

    async fn bucketed(
        &self,
        query: &GroupByQuery,
        store: &dyn GroupByCacheStore,
        target: &str,
        writeback: bool,
    ) -> crate::Result<GroupByQuery> {
        if !query.granularity.is_all() {
            return Err(MergeError::GranularityNotAll.into());
        }
        let schema = MergeSchema::from_query(query)?;
        let slots = decompose_all(&query.intervals)?;
        let dimensions = query.dimension_names();

        let mut stats = BucketStats::default();
        let mut accumulator = MergeAccumulator::new(schema);

        for slot in &slots {
            let (mut rows, source) = self.resolve(query, store, target, slot).await?;

            if source == BucketSource::Live {
                stats.misses += 1;
                if writeback {
                    let persisted = PersistenceRow::from_results(query, slot, &rows)?;
                    let count = persisted.len();
                    store.insert_batch(target, persisted, self.ttl).await?;
                    stats.written += count;
                    debug!(bucket = %slot, rows = count, "Wrote bucket back to cache");
                }
            } else {
                stats.hits += 1;
            }

            sort_by_dimensions(&mut rows, &dimensions)?;
            accumulator = accumulator.fold(slot, rows)?;
        }

        info!(
            buckets = accumulator.buckets(),
            hits = stats.hits,
            misses = stats.misses,
            written = stats.written,
            "Bucketed query complete"
        );

        let mut result = query.with_intervals(query.intervals.clone());
        result.result = accumulator.into_rows();
        Ok(result)
    }

    /// Rows of one bucket, from the store when present, else live
    async fn resolve(
        &self,
        query: &GroupByQuery,
        store: &dyn GroupByCacheStore,
        target: &str,
        slot: &IntervalSlot,
    ) -> crate::Result<(Vec<ResultRow>, BucketSource)> {
        let address = CacheAddress::for_bucket(query, slot)?;
        let cached = store.select(target, address.conditions()).await?;

        if !cached.is_empty() {
            debug!(bucket = %slot, rows = cached.len(), "Cache hit");
            let rows = cached
                .iter()
                .map(|row| {
                    row.check_shape(query)?;
                    row.to_result_row()
                })
                .collect::<Result<Vec<_>, CacheError>>()?;
            return Ok((rows, BucketSource::Cache));
        }

        debug!(bucket = %slot, "Cache miss, querying live");
        let sub_query = query.with_intervals(vec![slot.to_interval()]);
        let response = self.executor.execute(&sub_query).await?;
        Ok((response.rows, BucketSource::Live))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::persistence::bucket_timestamp;
    use crate::cache::store::MemoryGroupByStore;
    use crate::client::{ClientResult, QueryResponse};
    use crate::merge::{Event, Value};
    use crate::query::{
        Aggregation, Filter, Granularity, Having, LimitSpec, PostAggregation, SimpleGranularity,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers each bucket from a fixed table of per-day rows
    struct MockExecutor {
        calls: AtomicUsize,
        intervals: Mutex<Vec<Vec<String>>>,
        days: BTreeMap<String, Vec<(&'static str, i64, i64)>>,
    }

    impl MockExecutor {
        fn new(days: &[(&str, Vec<(&'static str, i64, i64)>)]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                intervals: Mutex::new(Vec::new()),
                days: days
                    .iter()
                    .map(|(start, rows)| (start.to_string(), rows.clone()))
                    .collect(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryExecutor for MockExecutor {
        async fn execute(&self, query: &GroupByQuery) -> ClientResult<QueryResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.intervals.lock().unwrap().push(query.intervals.clone());

            let slot = IntervalSlot::parse(&query.intervals[0]).unwrap();
            let timestamp = bucket_timestamp(slot.epoch_start()).unwrap();
            let day = &query.intervals[0][..10];
            let rows: Vec<ResultRow> = self
                .days
                .get(day)
                .into_iter()
                .flatten()
                .map(|(os, sum, count)| {
                    let mut event = Event::new();
                    event.insert("os".to_string(), Value::from(*os));
                    event.insert("sum".to_string(), Value::Int64(*sum));
                    event.insert("count".to_string(), Value::Int64(*count));
                    event.insert("avg".to_string(), Value::Float64(*sum as f64 / *count as f64));
                    ResultRow::new(timestamp.clone(), event)
                })
                .collect();

            let raw = serde_json::to_vec(&rows)?;
            Ok(QueryResponse { rows, raw })
        }
    }

    fn query(interval: &str) -> GroupByQuery {
        GroupByQuery::builder("events")
            .dimension("os")
            .aggregation(Aggregation::long_sum("sum", "value"))
            .aggregation(Aggregation::count("count"))
            .post_aggregation(PostAggregation::arithmetic(
                "avg",
                "/",
                vec![PostAggregation::field("sum"), PostAggregation::field("count")],
            ))
            .interval(interval)
            .build()
    }

    fn two_days() -> MockExecutor {
        MockExecutor::new(&[
            ("2024-01-01", vec![("ios", 10, 4), ("android", 3, 1)]),
            ("2024-01-02", vec![("ios", 15, 6), ("web", 7, 7)]),
        ])
    }

    #[tokio::test]
    async fn test_pass_through_without_store() {
        let executor = Arc::new(two_days());
        let bucketed = BucketedQuery::new(executor.clone());
        let q = query("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z");

        let result = bucketed.cache_query(&q, Some("t"), true).await.unwrap();
        assert_eq!(executor.calls(), 1);
        assert_eq!(result.result.len(), 2);
        assert_eq!(result.intervals, q.intervals);
    }

    #[tokio::test]
    async fn test_single_day_bucket_miss() {
        let executor = Arc::new(two_days());
        let store = Arc::new(MemoryGroupByStore::new());
        let bucketed = BucketedQuery::new(executor.clone()).with_store(store.clone());

        let q = query("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z");
        let result = bucketed.cache_query(&q, Some("t"), false).await.unwrap();

        assert_eq!(executor.calls(), 1);
        assert_eq!(
            executor.intervals.lock().unwrap()[0],
            vec!["2024-01-01T00:00:00Z/2024-01-02T00:00:00Z".to_string()]
        );
        assert_eq!(result.result.len(), 2);
        assert_eq!(result.result[0].event["os"], Value::from("android"));
        assert_eq!(store.row_count("t").await, 0);
    }

    #[tokio::test]
    async fn test_writeback_then_cache_path_identical() {
        let executor = Arc::new(two_days());
        let store = Arc::new(MemoryGroupByStore::new());
        let bucketed = BucketedQuery::new(executor.clone()).with_store(store.clone());
        let q = query("2024-01-01T00:00:00Z/2024-01-03T00:00:00Z");

        let live = bucketed.cache_query(&q, Some("t"), true).await.unwrap();
        assert_eq!(executor.calls(), 2);
        assert_eq!(store.row_count("t").await, 4);

        let cached = bucketed.cache_query(&q, Some("t"), true).await.unwrap();
        assert_eq!(executor.calls(), 2);
        assert_eq!(cached.result, live.result);
    }

    #[tokio::test]
    async fn test_merged_sums_and_recomputed_average() {
        let executor = Arc::new(two_days());
        let store = Arc::new(MemoryGroupByStore::new());
        let bucketed = BucketedQuery::new(executor).with_store(store);

        let q = query("2024-01-01T00:00:00Z/2024-01-03T00:00:00Z");
        let result = bucketed.cache_query(&q, Some("t"), true).await.unwrap();

        let os: Vec<&Value> = result.result.iter().map(|r| &r.event["os"]).collect();
        assert_eq!(os, vec![&Value::from("android"), &Value::from("ios"), &Value::from("web")]);

        let ios = &result.result[1].event;
        assert_eq!(ios["sum"], Value::Int64(25));
        assert_eq!(ios["count"], Value::Int64(10));
        assert_eq!(ios["avg"], Value::Float64(2.5));
    }

    #[tokio::test]
    async fn test_partial_cache_queries_only_missing_bucket() {
        let executor = Arc::new(two_days());
        let store = Arc::new(MemoryGroupByStore::new());
        let bucketed = BucketedQuery::new(executor.clone()).with_store(store);

        bucketed
            .cache_query(&query("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z"), Some("t"), true)
            .await
            .unwrap();
        assert_eq!(executor.calls(), 1);

        bucketed
            .cache_query(&query("2024-01-01T00:00:00Z/2024-01-03T00:00:00Z"), Some("t"), true)
            .await
            .unwrap();
        assert_eq!(executor.calls(), 2);
        assert_eq!(
            executor.intervals.lock().unwrap()[1],
            vec!["2024-01-02T00:00:00Z/2024-01-03T00:00:00Z".to_string()]
        );
    }

    #[tokio::test]
    async fn test_granularity_must_be_all() {
        let executor = Arc::new(two_days());
        let bucketed = BucketedQuery::new(executor.clone()).with_store(Arc::new(MemoryGroupByStore::new()));

        let mut q = query("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z");
        q.granularity = Granularity::Simple(SimpleGranularity::Day);

        let result = bucketed.cache_query(&q, Some("t"), true).await;
        assert!(matches!(
            result,
            Err(crate::Error::Merge(MergeError::GranularityNotAll))
        ));
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_intervals_rejected() {
        let executor = Arc::new(two_days());
        let bucketed = BucketedQuery::new(executor).with_store(Arc::new(MemoryGroupByStore::new()));

        let mut q = query("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z");
        q.intervals.push("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z".to_string());

        let result = bucketed.cache_query(&q, Some("t"), false).await;
        assert!(matches!(
            result,
            Err(crate::Error::Merge(MergeError::DuplicateBucket(_)))
        ));
    }

    #[test]
    fn test_accumulator_rejects_duplicate_bucket() {
        let q = query("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z");
        let slot = IntervalSlot::parse(&q.intervals[0]).unwrap();
        let accumulator = MergeAccumulator::new(MergeSchema::from_query(&q).unwrap())
            .fold(&slot, Vec::new())
            .unwrap();
        assert_eq!(accumulator.buckets(), 1);
        assert!(matches!(
            accumulator.fold(&slot, Vec::new()),
            Err(MergeError::DuplicateBucket(_))
        ));
    }

    /// Answers every query through a closure over the query
    struct RowsExecutor {
        calls: AtomicUsize,
        rows: Box<dyn Fn(&GroupByQuery) -> Vec<ResultRow> + Send + Sync>,
    }

    impl RowsExecutor {
        fn new(rows: impl Fn(&GroupByQuery) -> Vec<ResultRow> + Send + Sync + 'static) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                rows: Box::new(rows),
            }
        }
    }

    #[async_trait]
    impl QueryExecutor for RowsExecutor {
        async fn execute(&self, query: &GroupByQuery) -> ClientResult<QueryResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rows = (self.rows)(query);
            let raw = serde_json::to_vec(&rows)?;
            Ok(QueryResponse { rows, raw })
        }
    }

    fn total_row(os: Value, total: i64) -> ResultRow {
        let mut event = Event::new();
        event.insert("os".to_string(), os);
        event.insert("total".to_string(), Value::Int64(total));
        ResultRow::new("2024-01-01T00:00:00.000Z", event)
    }

    fn total_query(aggregation: Aggregation) -> GroupByQuery {
        GroupByQuery::builder("traffic")
            .dimension("os")
            .aggregation(aggregation)
            .interval("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z")
            .build()
    }

    #[tokio::test]
    async fn test_aggregation_definitions_do_not_share_buckets() {
        // the total depends on which column is summed
        let executor = Arc::new(RowsExecutor::new(|query| {
            let definition = serde_json::to_value(&query.aggregations[0]).unwrap();
            let total = match definition["fieldName"].as_str() {
                Some("bytes") => 100,
                _ => 7,
            };
            vec![total_row(Value::from("ios"), total)]
        }));
        let bucketed = BucketedQuery::new(executor.clone())
            .with_store(Arc::new(MemoryGroupByStore::new()));

        let bytes = bucketed
            .cache_query(&total_query(Aggregation::long_sum("total", "bytes")), Some("t"), true)
            .await
            .unwrap();
        let packets = bucketed
            .cache_query(&total_query(Aggregation::long_sum("total", "packets")), Some("t"), true)
            .await
            .unwrap();

        assert_eq!(bytes.result[0].event["total"], Value::Int64(100));
        assert_eq!(packets.result[0].event["total"], Value::Int64(7));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_filtered_aggregations_do_not_share_buckets() {
        let executor = Arc::new(RowsExecutor::new(|query| {
            let definition = serde_json::to_value(&query.aggregations[0]).unwrap();
            let total = match definition["filter"]["value"].as_str() {
                Some("NZ") => 5,
                _ => 50,
            };
            vec![total_row(Value::from("ios"), total)]
        }));
        let bucketed = BucketedQuery::new(executor)
            .with_store(Arc::new(MemoryGroupByStore::new()));

        let visits = |country: &str| {
            total_query(Aggregation::filtered(
                Filter::selector("country", country),
                Aggregation::long_sum("total", "visits"),
            ))
        };
        let nz = bucketed.cache_query(&visits("NZ"), Some("t"), true).await.unwrap();
        let au = bucketed.cache_query(&visits("AU"), Some("t"), true).await.unwrap();

        assert_eq!(nz.result[0].event["total"], Value::Int64(5));
        assert_eq!(au.result[0].event["total"], Value::Int64(50));
    }

    #[tokio::test]
    async fn test_null_dimension_group_across_buckets() {
        let executor = Arc::new(RowsExecutor::new(|query| {
            let total = if query.intervals[0].starts_with("2024-01-01") { 10 } else { 15 };
            vec![
                total_row(Value::Null, total),
                total_row(Value::from("ios"), 1),
            ]
        }));
        let store = Arc::new(MemoryGroupByStore::new());
        let bucketed = BucketedQuery::new(executor.clone()).with_store(store);

        let mut q = total_query(Aggregation::long_sum("total", "bytes"));
        q.intervals = vec!["2024-01-01T00:00:00Z/2024-01-03T00:00:00Z".to_string()];

        let live = bucketed.cache_query(&q, Some("t"), true).await.unwrap();
        assert_eq!(live.result.len(), 2);
        assert_eq!(live.result[0].event["os"], Value::Null);
        assert_eq!(live.result[0].event["total"], Value::Int64(25));
        assert_eq!(live.result[1].event["total"], Value::Int64(2));

        let cached = bucketed.cache_query(&q, Some("t"), true).await.unwrap();
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.result, live.result);
    }

    #[tokio::test]
    async fn test_limit_and_having_pass_through() {
        let executor = Arc::new(two_days());
        let store = Arc::new(MemoryGroupByStore::new());
        let bucketed = BucketedQuery::new(executor.clone()).with_store(store.clone());

        let mut limited = query("2024-01-01T00:00:00Z/2024-01-03T00:00:00Z");
        limited.limit_spec = Some(LimitSpec::Default {
            limit: Some(1),
            columns: Vec::new(),
        });
        bucketed.cache_query(&limited, Some("t"), true).await.unwrap();
        assert_eq!(executor.calls(), 1);
        assert_eq!(
            executor.intervals.lock().unwrap()[0],
            vec!["2024-01-01T00:00:00Z/2024-01-03T00:00:00Z".to_string()]
        );

        let mut filtered = query("2024-01-01T00:00:00Z/2024-01-03T00:00:00Z");
        filtered.having = Some(Having::GreaterThan {
            aggregation: "sum".to_string(),
            value: 20.into(),
        });
        bucketed.cache_query(&filtered, Some("t"), true).await.unwrap();
        assert_eq!(executor.calls(), 2);
        assert_eq!(store.row_count("t").await, 0);
    }
}
