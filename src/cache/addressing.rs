//! Cache addressing
//!
//! A cached bucket is identified by the bucket itself plus everything that
//! shapes its rows. The address is expressed as equality conditions over the
//! text-encoded columns of a [`PersistenceRow`](crate::cache::PersistenceRow),
//! so any store that can filter rows by field can serve lookups.

use crate::cache::interval::IntervalSlot;
use crate::query::{Condition, Filter, GroupByQuery};
use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::Value as JsonValue;

pub const BUCKET_START: &str = "bucketStart";
pub const BUCKET_DURATION_SECONDS: &str = "bucketDurationSeconds";
pub const DATA_SOURCE: &str = "dataSource";
pub const GROUP_DIM_NAMES: &str = "groupDimNames";
pub const AGG_NAMES: &str = "aggNames";
pub const AGG_TYPES: &str = "aggTypes";
pub const AGG_FINGERPRINT: &str = "aggFingerprint";
pub const POST_AGG_NAMES: &str = "postAggNames";
pub const POST_AGG_FINGERPRINT: &str = "postAggFingerprint";
pub const FILTER_FINGERPRINT: &str = "filterFingerprint";

/// Columns that together identify one bucket of one query shape
pub const ADDRESS_COLUMNS: [&str; 10] = [
    BUCKET_START,
    BUCKET_DURATION_SECONDS,
    DATA_SOURCE,
    GROUP_DIM_NAMES,
    AGG_NAMES,
    AGG_TYPES,
    AGG_FINGERPRINT,
    POST_AGG_NAMES,
    POST_AGG_FINGERPRINT,
    FILTER_FINGERPRINT,
];

/// Lowercase hex MD5 of `bytes`
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Serialize through `serde_json::Value` so object keys come out sorted
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    Ok(serde_json::to_value(value)?.to_string())
}

/// Fingerprint of a filter, empty when there is none
pub fn filter_fingerprint(filter: Option<&Filter>) -> serde_json::Result<String> {
    match filter {
        Some(filter) => Ok(fingerprint(canonical_json(filter)?.as_bytes())),
        None => Ok(String::new()),
    }
}

/// Fingerprint of the full aggregation definitions. Covers field names and
/// the filters of `filtered` aggregators, which the names and types miss.
pub fn aggregations_fingerprint(query: &GroupByQuery) -> serde_json::Result<String> {
    Ok(fingerprint(canonical_json(&query.aggregations)?.as_bytes()))
}

/// Fingerprint of the full post-aggregation trees
pub fn post_aggregations_fingerprint(query: &GroupByQuery) -> serde_json::Result<String> {
    Ok(fingerprint(canonical_json(&query.post_aggregations)?.as_bytes()))
}

/// Key of a whole query in the simple result cache
pub fn query_fingerprint(query: &GroupByQuery) -> serde_json::Result<String> {
    Ok(fingerprint(canonical_json(query)?.as_bytes()))
}

fn names_json(names: Vec<String>) -> String {
    JsonValue::from(names).to_string()
}

/// The lookup conditions of one bucket of one query
#[derive(Debug, Clone, PartialEq)]
pub struct CacheAddress {
    conditions: Vec<Condition>,
}

impl CacheAddress {
    pub fn for_bucket(query: &GroupByQuery, slot: &IntervalSlot) -> serde_json::Result<Self> {
        let conditions = vec![
            Condition::eq(BUCKET_START, slot.epoch_start().to_string()),
            Condition::eq(BUCKET_DURATION_SECONDS, slot.duration_seconds.to_string()),
            Condition::eq(DATA_SOURCE, query.data_source.as_str()),
            Condition::eq(GROUP_DIM_NAMES, names_json(query.dimension_names())),
            Condition::eq(AGG_NAMES, names_json(query.aggregation_names())),
            Condition::eq(AGG_TYPES, names_json(query.aggregation_types())),
            Condition::eq(AGG_FINGERPRINT, aggregations_fingerprint(query)?),
            Condition::eq(POST_AGG_NAMES, names_json(query.post_aggregation_names())),
            Condition::eq(POST_AGG_FINGERPRINT, post_aggregations_fingerprint(query)?),
            Condition::eq(FILTER_FINGERPRINT, filter_fingerprint(query.filter.as_ref())?),
        ];
        Ok(Self { conditions })
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn into_conditions(self) -> Vec<Condition> {
        self.conditions
    }
}
