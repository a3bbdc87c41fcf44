//! Aggregations
//!
//! Only the associative family (`count`, `*Sum`, `min`/`max` and their typed
//! variants, and `filtered` wrapping one of them) can be merged across
//! buckets. The rest are still expressible so they can be sent to Druid
//! directly.

use crate::merge::algebra::MergeKind;
use crate::merge::{MergeError, MergeResult};
use crate::query::filter::Filter;
use serde::{Deserialize, Serialize};

/// A Druid aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Aggregation {
    Count {
        name: String,
    },
    LongSum {
        name: String,
        field_name: String,
    },
    DoubleSum {
        name: String,
        field_name: String,
    },
    FloatSum {
        name: String,
        field_name: String,
    },
    Min {
        name: String,
        field_name: String,
    },
    Max {
        name: String,
        field_name: String,
    },
    DoubleMin {
        name: String,
        field_name: String,
    },
    DoubleMax {
        name: String,
        field_name: String,
    },
    LongMin {
        name: String,
        field_name: String,
    },
    LongMax {
        name: String,
        field_name: String,
    },
    FloatMin {
        name: String,
        field_name: String,
    },
    FloatMax {
        name: String,
        field_name: String,
    },
    Filtered {
        filter: Filter,
        aggregator: Box<Aggregation>,
    },
    Cardinality {
        name: String,
        fields: Vec<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        by_row: bool,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        round: bool,
    },
    HyperUnique {
        name: String,
        field_name: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        round: bool,
    },
    Javascript {
        name: String,
        field_names: Vec<String>,
        fn_aggregate: String,
        fn_combine: String,
        fn_reset: String,
    },
    ApproxHistogramFold {
        name: String,
        field_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolution: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_buckets: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower_limit: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper_limit: Option<String>,
    },
}

impl Aggregation {
    pub fn count(name: impl Into<String>) -> Self {
        Aggregation::Count { name: name.into() }
    }

    pub fn long_sum(name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Aggregation::LongSum {
            name: name.into(),
            field_name: field_name.into(),
        }
    }

    pub fn double_sum(name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Aggregation::DoubleSum {
            name: name.into(),
            field_name: field_name.into(),
        }
    }

    pub fn long_min(name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Aggregation::LongMin {
            name: name.into(),
            field_name: field_name.into(),
        }
    }

    pub fn long_max(name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Aggregation::LongMax {
            name: name.into(),
            field_name: field_name.into(),
        }
    }

    pub fn filtered(filter: Filter, aggregator: Aggregation) -> Self {
        Aggregation::Filtered {
            filter,
            aggregator: Box::new(aggregator),
        }
    }

    /// Output name; a filtered aggregator reports its wrapped aggregator's name
    pub fn name(&self) -> &str {
        match self {
            Aggregation::Filtered { aggregator, .. } => aggregator.name(),
            Aggregation::Count { name }
            | Aggregation::LongSum { name, .. }
            | Aggregation::DoubleSum { name, .. }
            | Aggregation::FloatSum { name, .. }
            | Aggregation::Min { name, .. }
            | Aggregation::Max { name, .. }
            | Aggregation::DoubleMin { name, .. }
            | Aggregation::DoubleMax { name, .. }
            | Aggregation::LongMin { name, .. }
            | Aggregation::LongMax { name, .. }
            | Aggregation::FloatMin { name, .. }
            | Aggregation::FloatMax { name, .. }
            | Aggregation::Cardinality { name, .. }
            | Aggregation::HyperUnique { name, .. }
            | Aggregation::Javascript { name, .. }
            | Aggregation::ApproxHistogramFold { name, .. } => name,
        }
    }

    /// Wire type name; a filtered aggregator reports its wrapped aggregator's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Aggregation::Filtered { aggregator, .. } => aggregator.type_name(),
            Aggregation::Count { .. } => "count",
            Aggregation::LongSum { .. } => "longSum",
            Aggregation::DoubleSum { .. } => "doubleSum",
            Aggregation::FloatSum { .. } => "floatSum",
            Aggregation::Min { .. } => "min",
            Aggregation::Max { .. } => "max",
            Aggregation::DoubleMin { .. } => "doubleMin",
            Aggregation::DoubleMax { .. } => "doubleMax",
            Aggregation::LongMin { .. } => "longMin",
            Aggregation::LongMax { .. } => "longMax",
            Aggregation::FloatMin { .. } => "floatMin",
            Aggregation::FloatMax { .. } => "floatMax",
            Aggregation::Cardinality { .. } => "cardinality",
            Aggregation::HyperUnique { .. } => "hyperUnique",
            Aggregation::Javascript { .. } => "javascript",
            Aggregation::ApproxHistogramFold { .. } => "approxHistogramFold",
        }
    }

    /// How partial results of this aggregator combine across buckets
    pub fn merge_kind(&self) -> MergeResult<MergeKind> {
        merge_kind_for(self.type_name())
    }
}

/// Merge kind for an aggregation type name as stored with cached rows
pub fn merge_kind_for(type_name: &str) -> MergeResult<MergeKind> {
    match type_name {
        "count" | "longSum" | "doubleSum" | "floatSum" => Ok(MergeKind::Sum),
        "min" | "doubleMin" | "longMin" | "floatMin" => Ok(MergeKind::Min),
        "max" | "doubleMax" | "longMax" | "floatMax" => Ok(MergeKind::Max),
        other => Err(MergeError::UnsupportedAggregation(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filtered_resolves_to_child() {
        let agg = Aggregation::filtered(
            Filter::selector("os", "ios"),
            Aggregation::long_sum("ios_events", "events"),
        );
        assert_eq!(agg.name(), "ios_events");
        assert_eq!(agg.type_name(), "longSum");
        assert_eq!(agg.merge_kind().unwrap(), MergeKind::Sum);
    }

    #[test]
    fn test_merge_kinds() {
        assert_eq!(Aggregation::count("n").merge_kind().unwrap(), MergeKind::Sum);
        assert_eq!(
            Aggregation::long_min("lo", "v").merge_kind().unwrap(),
            MergeKind::Min
        );
        assert_eq!(
            Aggregation::long_max("hi", "v").merge_kind().unwrap(),
            MergeKind::Max
        );

        let cardinality = Aggregation::Cardinality {
            name: "users".to_string(),
            fields: vec!["user".to_string()],
            by_row: false,
            round: false,
        };
        assert_eq!(
            cardinality.merge_kind().unwrap_err(),
            MergeError::UnsupportedAggregation("cardinality".to_string())
        );
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(
            serde_json::to_value(Aggregation::long_sum("sum", "value")).unwrap(),
            json!({"type": "longSum", "name": "sum", "fieldName": "value"})
        );

        let parsed: Aggregation = serde_json::from_value(json!({
            "type": "filtered",
            "filter": {"type": "selector", "dimension": "os", "value": "ios"},
            "aggregator": {"type": "count", "name": "ios_count"}
        }))
        .unwrap();
        assert_eq!(parsed.name(), "ios_count");
        assert_eq!(parsed.type_name(), "count");
    }
}
