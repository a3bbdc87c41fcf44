//! Post-aggregations

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A Druid post-aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PostAggregation {
    FieldAccess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        field_name: String,
    },
    Constant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        value: Number,
    },
    Arithmetic {
        name: String,
        #[serde(rename = "fn")]
        func: String,
        fields: Vec<PostAggregation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ordering: Option<String>,
    },
}

impl PostAggregation {
    pub fn field(field_name: impl Into<String>) -> Self {
        PostAggregation::FieldAccess {
            name: None,
            field_name: field_name.into(),
        }
    }

    pub fn constant(value: impl Into<Number>) -> Self {
        PostAggregation::Constant {
            name: None,
            value: value.into(),
        }
    }

    pub fn arithmetic(
        name: impl Into<String>,
        func: impl Into<String>,
        fields: Vec<PostAggregation>,
    ) -> Self {
        PostAggregation::Arithmetic {
            name: name.into(),
            func: func.into(),
            fields,
            ordering: None,
        }
    }

    /// Output name, when the post-aggregator has one
    pub fn name(&self) -> Option<&str> {
        match self {
            PostAggregation::FieldAccess { name, .. } | PostAggregation::Constant { name, .. } => {
                name.as_deref()
            }
            PostAggregation::Arithmetic { name, .. } => Some(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arithmetic_wire_format() {
        let avg = PostAggregation::arithmetic(
            "avg",
            "/",
            vec![PostAggregation::field("sum"), PostAggregation::field("count")],
        );
        assert_eq!(
            serde_json::to_value(&avg).unwrap(),
            json!({
                "type": "arithmetic",
                "name": "avg",
                "fn": "/",
                "fields": [
                    {"type": "fieldAccess", "fieldName": "sum"},
                    {"type": "fieldAccess", "fieldName": "count"}
                ]
            })
        );
        assert_eq!(avg.name(), Some("avg"));
        assert_eq!(PostAggregation::constant(3).name(), None);
    }
}
