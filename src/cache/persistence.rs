//! Persistence rows
//!
//! One [`PersistenceRow`] stores one result row of one bucket. Name arrays
//! and value arrays are positionally aligned: `agg_values[i]` is the value
//! of `agg_names[i]`, and so on.

use crate::cache::addressing::{
    aggregations_fingerprint, filter_fingerprint, post_aggregations_fingerprint,
};
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::interval::IntervalSlot;
use crate::merge::{Event, MergeError, Token, Value};
use crate::query::{GroupByQuery, ResultRow};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// A cached result row together with the key columns that address it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceRow {
    /// Bucket start, Unix epoch seconds
    pub bucket_start: i64,
    pub bucket_duration_seconds: i64,
    #[serde(default)]
    pub data_source: String,
    pub group_dim_names: Vec<String>,
    pub agg_names: Vec<String>,
    pub post_agg_names: Vec<String>,
    /// MD5 of the canonical aggregation definitions
    #[serde(default)]
    pub agg_fingerprint: String,
    /// MD5 of the canonical post-aggregation trees
    #[serde(default)]
    pub post_agg_fingerprint: String,
    pub filter_fingerprint: String,
    pub group_dim_values: Vec<Value>,
    pub agg_types: Vec<String>,
    /// Prefix token list per post-aggregation
    pub post_agg_expressions: Vec<Vec<Token>>,
    pub agg_values: Vec<Value>,
    pub post_agg_values: Vec<Value>,
}

const INTEGER_COLUMNS: [&str; 2] = ["bucketStart", "bucketDurationSeconds"];
const TEXT_COLUMNS: [&str; 4] = [
    "dataSource",
    "aggFingerprint",
    "postAggFingerprint",
    "filterFingerprint",
];

impl PersistenceRow {
    /// Convert one bucket's result rows for writeback
    pub fn from_results(
        query: &GroupByQuery,
        slot: &IntervalSlot,
        rows: &[ResultRow],
    ) -> crate::Result<Vec<Self>> {
        if !query.granularity.is_all() {
            return Err(MergeError::GranularityNotAll.into());
        }

        let group_dim_names = query.dimension_names();
        let agg_names = query.aggregation_names();
        let post_agg_names = query.post_aggregation_names();
        let agg_types = query.aggregation_types();
        let post_agg_expressions = query.post_aggregation_expressions()?;
        let fingerprint = filter_fingerprint(query.filter.as_ref())?;
        let agg_fingerprint = aggregations_fingerprint(query)?;
        let post_agg_fingerprint = post_aggregations_fingerprint(query)?;

        let pick = |event: &Event, names: &[String]| -> Vec<Value> {
            names
                .iter()
                .map(|n| event.get(n).cloned().unwrap_or(Value::Null))
                .collect()
        };

        Ok(rows
            .iter()
            .map(|row| Self {
                bucket_start: slot.epoch_start(),
                bucket_duration_seconds: slot.duration_seconds,
                data_source: query.data_source.clone(),
                group_dim_values: pick(&row.event, &group_dim_names),
                agg_values: pick(&row.event, &agg_names),
                post_agg_values: pick(&row.event, &post_agg_names),
                group_dim_names: group_dim_names.clone(),
                agg_names: agg_names.clone(),
                post_agg_names: post_agg_names.clone(),
                agg_fingerprint: agg_fingerprint.clone(),
                post_agg_fingerprint: post_agg_fingerprint.clone(),
                filter_fingerprint: fingerprint.clone(),
                agg_types: agg_types.clone(),
                post_agg_expressions: post_agg_expressions.clone(),
            })
            .collect())
    }

    /// Reject rows whose value arrays do not line up with their name arrays
    pub fn validate(&self) -> CacheResult<()> {
        let aligned = [
            ("groupDimValues", self.group_dim_values.len(), self.group_dim_names.len()),
            ("aggTypes", self.agg_types.len(), self.agg_names.len()),
            ("aggValues", self.agg_values.len(), self.agg_names.len()),
            ("postAggExpressions", self.post_agg_expressions.len(), self.post_agg_names.len()),
            ("postAggValues", self.post_agg_values.len(), self.post_agg_names.len()),
        ];

        for (column, actual, expected) in aligned {
            if actual != expected {
                return Err(CacheError::Corrupt(format!(
                    "{} has {} entries, expected {}",
                    column, actual, expected
                )));
            }
        }
        Ok(())
    }

    /// Check the row was written for a query of the given shape: same
    /// columns, same aggregation types and same post-aggregation expressions
    pub fn check_shape(&self, query: &GroupByQuery) -> CacheResult<()> {
        self.validate()?;
        let expressions = query
            .post_aggregation_expressions()
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        if self.group_dim_names != query.dimension_names()
            || self.agg_names != query.aggregation_names()
            || self.agg_types != query.aggregation_types()
            || self.post_agg_names != query.post_aggregation_names()
            || self.post_agg_expressions != expressions
        {
            return Err(CacheError::Corrupt(format!(
                "row at bucket {} does not match the query's columns",
                self.bucket_start
            )));
        }
        Ok(())
    }

    /// Rebuild the result row. Null dimensions are kept, since null is a
    /// group of its own; null aggregates are left out of the event.
    pub fn to_result_row(&self) -> CacheResult<ResultRow> {
        self.validate()?;

        let mut event: Event = self
            .group_dim_names
            .iter()
            .cloned()
            .zip(self.group_dim_values.iter().cloned())
            .collect();
        let metrics = self
            .agg_names
            .iter()
            .zip(&self.agg_values)
            .chain(self.post_agg_names.iter().zip(&self.post_agg_values));
        for (name, value) in metrics {
            if !value.is_null() {
                event.insert(name.clone(), value.clone());
            }
        }

        Ok(ResultRow::new(bucket_timestamp(self.bucket_start)?, event))
    }

    /// Text-transport encoding: integers as decimal strings, the fingerprint
    /// as is, and every array as JSON text
    pub fn to_cache_row(&self) -> CacheResult<BTreeMap<String, String>> {
        let object = match serde_json::to_value(self) {
            Ok(JsonValue::Object(object)) => object,
            Ok(other) => {
                return Err(CacheError::Corrupt(format!(
                    "row encoded as {} instead of an object",
                    other
                )))
            }
            Err(e) => return Err(CacheError::Corrupt(e.to_string())),
        };

        Ok(object
            .into_iter()
            .map(|(column, value)| {
                let text = match value {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                };
                (column, text)
            })
            .collect())
    }

    /// Decode a row produced by [`to_cache_row`](Self::to_cache_row)
    pub fn from_cache_row(row: &BTreeMap<String, String>) -> CacheResult<Self> {
        let mut object = Map::new();
        for (column, text) in row {
            let value = if INTEGER_COLUMNS.contains(&column.as_str()) {
                let n: i64 = text.parse().map_err(|_| {
                    CacheError::Corrupt(format!("`{}` is not an integer: {:?}", column, text))
                })?;
                JsonValue::from(n)
            } else if TEXT_COLUMNS.contains(&column.as_str()) {
                JsonValue::String(text.clone())
            } else {
                serde_json::from_str(text).map_err(|e| {
                    CacheError::Corrupt(format!("`{}` is not valid JSON: {}", column, e))
                })?
            };
            object.insert(column.clone(), value);
        }

        let parsed: Self = serde_json::from_value(JsonValue::Object(object))
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }
}

/// Druid-style row timestamp for a bucket starting at `epoch_seconds`
pub fn bucket_timestamp(epoch_seconds: i64) -> CacheResult<String> {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| CacheError::Corrupt(format!("bucket start {} out of range", epoch_seconds)))
}
