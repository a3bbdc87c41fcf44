//! Druid filters
//!
//! Typed filter tree in Druid's wire format plus the translation of the
//! conjunctive subset (`selector`, `bound`, `and`, single-condition `not`)
//! into [`Condition`] lists.

use crate::query::condition::{Condition, ConditionOp};
use crate::query::error::{ConditionError, ConditionResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A Druid filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Filter {
    Selector {
        dimension: String,
        value: JsonValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extraction_fn: Option<JsonValue>,
    },
    In {
        dimension: String,
        values: Vec<JsonValue>,
    },
    Bound {
        dimension: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper: Option<String>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        lower_strict: bool,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        upper_strict: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ordering: Option<String>,
    },
    Regex {
        dimension: String,
        pattern: String,
    },
    Like {
        dimension: String,
        pattern: String,
    },
    Javascript {
        dimension: String,
        function: String,
    },
    Spatial {
        dimension: String,
        bound: JsonValue,
    },
    And {
        fields: Vec<Filter>,
    },
    Or {
        fields: Vec<Filter>,
    },
    Not {
        field: Box<Filter>,
    },
}

impl Filter {
    pub fn selector(dimension: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Filter::Selector {
            dimension: dimension.into(),
            value: value.into(),
            extraction_fn: None,
        }
    }

    /// Numeric or lexicographic range; `None` leaves that side open
    pub fn bound(
        dimension: impl Into<String>,
        lower: Option<(&str, bool)>,
        upper: Option<(&str, bool)>,
        ordering: Option<&str>,
    ) -> Self {
        Filter::Bound {
            dimension: dimension.into(),
            lower: lower.map(|(v, _)| v.to_string()),
            upper: upper.map(|(v, _)| v.to_string()),
            lower_strict: lower.map(|(_, s)| s).unwrap_or(false),
            upper_strict: upper.map(|(_, s)| s).unwrap_or(false),
            ordering: ordering.map(str::to_string),
        }
    }

    pub fn regex(dimension: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Regex {
            dimension: dimension.into(),
            pattern: pattern.into(),
        }
    }

    pub fn like(dimension: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like {
            dimension: dimension.into(),
            pattern: pattern.into(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not {
            field: Box::new(filter),
        }
    }

    /// Conjunction of `filters`, flattening nested `and`s.
    ///
    /// Returns `None` for an empty input and the filter itself for a single one.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Option<Self> {
        join(filters, true)
    }

    /// Disjunction of `filters`, flattening nested `or`s
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Option<Self> {
        join(filters, false)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Filter::Selector { .. } => "selector",
            Filter::In { .. } => "in",
            Filter::Bound { .. } => "bound",
            Filter::Regex { .. } => "regex",
            Filter::Like { .. } => "like",
            Filter::Javascript { .. } => "javascript",
            Filter::Spatial { .. } => "spatial",
            Filter::And { .. } => "and",
            Filter::Or { .. } => "or",
            Filter::Not { .. } => "not",
        }
    }

    /// Translate into conditions that must all hold.
    ///
    /// - `selector` becomes `dimension == value`
    /// - `bound` becomes `>=`/`>` and `<=`/`<` on its string bounds
    /// - `and` concatenates its children
    /// - `not` reverses the operator of a child that yields exactly one condition
    ///
    /// Every other filter type is rejected.
    pub fn to_conditions(&self) -> ConditionResult<Vec<Condition>> {
        match self {
            Filter::Selector {
                dimension, value, ..
            } => Ok(vec![Condition::new(
                dimension.clone(),
                ConditionOp::EqEq,
                value.clone(),
            )]),
            Filter::Bound {
                dimension,
                lower,
                upper,
                lower_strict,
                upper_strict,
                ..
            } => {
                let mut conditions = Vec::with_capacity(2);
                if let Some(lower) = lower {
                    let op = if *lower_strict {
                        ConditionOp::Gt
                    } else {
                        ConditionOp::Ge
                    };
                    conditions.push(Condition::new(dimension.clone(), op, lower.clone()));
                }
                if let Some(upper) = upper {
                    let op = if *upper_strict {
                        ConditionOp::Lt
                    } else {
                        ConditionOp::Le
                    };
                    conditions.push(Condition::new(dimension.clone(), op, upper.clone()));
                }
                Ok(conditions)
            }
            Filter::And { fields } => {
                let mut conditions = Vec::new();
                for field in fields {
                    conditions.extend(field.to_conditions()?);
                }
                Ok(conditions)
            }
            Filter::Not { field } => {
                let mut inner = field.to_conditions()?;
                if inner.len() != 1 {
                    return Err(ConditionError::NotReversible(format!(
                        "`not` over {} conditions",
                        inner.len()
                    )));
                }
                let mut condition = inner.remove(0);
                let op = condition.op;
                condition.op = op
                    .negate()
                    .ok_or_else(|| ConditionError::NotReversible(format!("operator {}", op)))?;
                Ok(vec![condition])
            }
            other => Err(ConditionError::Unsupported(other.type_name().to_string())),
        }
    }
}

fn join(filters: impl IntoIterator<Item = Filter>, conjunction: bool) -> Option<Filter> {
    let mut fields = Vec::new();
    for filter in filters {
        match filter {
            Filter::And { fields: nested } if conjunction => fields.extend(nested),
            Filter::Or { fields: nested } if !conjunction => fields.extend(nested),
            other => fields.push(other),
        }
    }

    match fields.len() {
        0 => None,
        1 => fields.pop(),
        _ if conjunction => Some(Filter::And { fields }),
        _ => Some(Filter::Or { fields }),
    }
}
