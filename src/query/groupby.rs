//! GroupBy query
//!
//! The typed query in Druid's JSON wire format together with the row shape
//! Druid returns for it.

use crate::merge::MergeResult;
use crate::merge::expression::{self, Token};
use crate::merge::Event;
use crate::query::aggregation::Aggregation;
use crate::query::dimension::DimensionSpec;
use crate::query::filter::Filter;
use crate::query::granularity::Granularity;
use crate::query::post_aggregation::PostAggregation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    #[default]
    #[serde(rename = "groupBy")]
    GroupBy,
}

/// A Druid groupBy query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByQuery {
    #[serde(default)]
    pub query_type: QueryType,
    pub data_source: String,
    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_spec: Option<LimitSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Having>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_aggregations: Vec<PostAggregation>,
    pub intervals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotals_spec: Option<Vec<Vec<String>>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_columns: Vec<VirtualColumn>,
    /// Rows filled in by execution; never sent over the wire
    #[serde(skip)]
    pub result: Vec<ResultRow>,
}

impl GroupByQuery {
    /// Start building a query against `data_source`
    pub fn builder(data_source: impl Into<String>) -> GroupByQueryBuilder {
        GroupByQueryBuilder::new(data_source)
    }

    /// Output names of the group-by dimensions, in order
    pub fn dimension_names(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .map(|d| d.output_name().to_string())
            .collect()
    }

    pub fn aggregation_names(&self) -> Vec<String> {
        self.aggregations
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn aggregation_types(&self) -> Vec<String> {
        self.aggregations
            .iter()
            .map(|a| a.type_name().to_string())
            .collect()
    }

    pub fn post_aggregation_names(&self) -> Vec<String> {
        self.post_aggregations
            .iter()
            .map(|p| p.name().unwrap_or_default().to_string())
            .collect()
    }

    /// Prefix token list of every post-aggregation, in order
    pub fn post_aggregation_expressions(&self) -> MergeResult<Vec<Vec<Token>>> {
        self.post_aggregations.iter().map(expression::flatten).collect()
    }

    /// Whether results for this query are final, i.e. every interval has ended
    pub fn should_cache(&self) -> bool {
        self.should_cache_at(Utc::now())
    }

    pub fn should_cache_at(&self, now: DateTime<Utc>) -> bool {
        !self.intervals.is_empty()
            && self.intervals.iter().all(|interval| {
                interval
                    .split_once('/')
                    .and_then(|(_, end)| DateTime::parse_from_rfc3339(end).ok())
                    .map(|end| end <= now)
                    .unwrap_or(false)
            })
    }

    /// A copy of this query restricted to `intervals`, without results
    pub fn with_intervals(&self, intervals: Vec<String>) -> Self {
        Self {
            intervals,
            result: Vec::new(),
            ..self.clone()
        }
    }
}

/// Builder for [`GroupByQuery`]
#[derive(Debug, Clone)]
pub struct GroupByQueryBuilder {
    query: GroupByQuery,
}

impl GroupByQueryBuilder {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            query: GroupByQuery {
                query_type: QueryType::GroupBy,
                data_source: data_source.into(),
                dimensions: Vec::new(),
                granularity: Granularity::all(),
                limit_spec: None,
                having: None,
                filter: None,
                aggregations: Vec::new(),
                post_aggregations: Vec::new(),
                intervals: Vec::new(),
                subtotals_spec: None,
                context: BTreeMap::new(),
                virtual_columns: Vec::new(),
                result: Vec::new(),
            },
        }
    }

    pub fn dimension(mut self, dimension: impl Into<DimensionSpec>) -> Self {
        self.query.dimensions.push(dimension.into());
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.query.granularity = granularity;
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.query.aggregations.push(aggregation);
        self
    }

    pub fn post_aggregation(mut self, post_aggregation: PostAggregation) -> Self {
        self.query.post_aggregations.push(post_aggregation);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn having(mut self, having: Having) -> Self {
        self.query.having = Some(having);
        self
    }

    pub fn limit_spec(mut self, limit_spec: LimitSpec) -> Self {
        self.query.limit_spec = Some(limit_spec);
        self
    }

    pub fn interval(mut self, interval: impl Into<String>) -> Self {
        self.query.intervals.push(interval.into());
        self
    }

    pub fn subtotals(mut self, keys: Vec<String>) -> Self {
        self.query.subtotals_spec.get_or_insert_with(Vec::new).push(keys);
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.query.context.insert(key.into(), value.into());
        self
    }

    pub fn virtual_column(mut self, column: VirtualColumn) -> Self {
        self.query.virtual_columns.push(column);
        self
    }

    pub fn build(self) -> GroupByQuery {
        self.query
    }
}

/// One row of a groupBy v1 result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub timestamp: String,
    pub event: Event,
}

impl ResultRow {
    pub fn new(timestamp: impl Into<String>, event: Event) -> Self {
        Self {
            version: Some("v1".to_string()),
            timestamp: timestamp.into(),
            event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LimitSpec {
    Default {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
        #[serde(default)]
        columns: Vec<OrderByColumn>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderByColumn {
    pub dimension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_order: Option<String>,
}

/// Post-grouping row filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Having {
    GreaterThan { aggregation: String, value: Number },
    LessThan { aggregation: String, value: Number },
    EqualTo { aggregation: String, value: Number },
    DimSelector { dimension: String, value: String },
    Filter { filter: Filter },
    And { having_specs: Vec<Having> },
    Or { having_specs: Vec<Having> },
    Not { having_spec: Box<Having> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VirtualColumn {
    Expression {
        name: String,
        expression: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_type: Option<String>,
    },
}
