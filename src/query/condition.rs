//! Relational predicates over cached fields
//!
//! A [`Condition`] reads as `candidate <op> literal`: the literal is fixed
//! when the condition is built and each stored field value is the
//! candidate. `Condition { op: Gt, value: 1 }` therefore matches 2 and
//! rejects 0.
//!
//! | literal | operators                  | candidate must be |
//! |---------|----------------------------|-------------------|
//! | number  | `= == != < <= > >=`        | number            |
//! | string  | `= == != < <= > >=`        | string            |
//! | bool    | `= == !=`                  | bool              |
//! | object  | `⊇`                        | object            |
//! | null    | `= == !=`                  | anything          |
//!
//! Anything outside the table evaluates to `false`; matching never errors.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "==")]
    EqEq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    /// Object containment: every key of the literal is present in the candidate
    #[serde(rename = "⊇")]
    Contains,
}

impl ConditionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Contains => "⊇",
        }
    }

    /// Parse an operator from its symbol
    pub fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "=" => Self::Eq,
            "==" => Self::EqEq,
            "!=" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "⊇" => Self::Contains,
            _ => return None,
        })
    }

    /// The operator that matches exactly the complement of this one
    pub fn negate(&self) -> Option<Self> {
        Some(match self {
            Self::Eq | Self::EqEq => Self::NotEq,
            Self::NotEq => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
            Self::Contains => return None,
        })
    }

    fn is_equality(&self) -> bool {
        matches!(self, Self::Eq | Self::EqEq | Self::NotEq)
    }

    /// Apply to the ordering of `candidate` relative to the literal
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq | Self::EqEq => ordering == Ordering::Equal,
            Self::NotEq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Contains => false,
        }
    }
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field_name: String,
    pub op: ConditionOp,
    pub value: JsonValue,
}

impl Condition {
    pub fn new(field_name: impl Into<String>, op: ConditionOp, value: impl Into<JsonValue>) -> Self {
        Self {
            field_name: field_name.into(),
            op,
            value: value.into(),
        }
    }

    /// `field = "value"`, the form used for cache addressing
    pub fn eq(field_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field_name, ConditionOp::Eq, JsonValue::String(value.into()))
    }

    /// Evaluate against a decoded candidate value
    pub fn matches(&self, candidate: &JsonValue) -> bool {
        match (&self.value, candidate) {
            (JsonValue::Null, c) => match self.op {
                ConditionOp::Eq | ConditionOp::EqEq => c.is_null(),
                ConditionOp::NotEq => !c.is_null(),
                _ => false,
            },
            (JsonValue::Number(lit), JsonValue::Number(c)) => {
                match (c.as_f64(), lit.as_f64()) {
                    (Some(c), Some(lit)) => c
                        .partial_cmp(&lit)
                        .map(|ord| self.op.accepts(ord))
                        .unwrap_or(false),
                    _ => false,
                }
            }
            (JsonValue::String(lit), JsonValue::String(c)) => {
                self.op != ConditionOp::Contains && self.op.accepts(c.as_str().cmp(lit.as_str()))
            }
            (JsonValue::Bool(lit), JsonValue::Bool(c)) => {
                self.op.is_equality() && self.op.accepts(c.cmp(lit))
            }
            (JsonValue::Object(lit), JsonValue::Object(c)) => {
                self.op == ConditionOp::Contains
                    && lit.iter().all(|(k, v)| c.get(k) == Some(v))
            }
            (JsonValue::Array(lit), JsonValue::Array(c)) => match self.op {
                ConditionOp::Eq | ConditionOp::EqEq => lit == c,
                ConditionOp::NotEq => lit != c,
                _ => false,
            },
            _ => false,
        }
    }

    /// Evaluate against a text-encoded candidate, as stored by text transports.
    ///
    /// The text is decoded according to the literal's kind first; text that
    /// does not decode simply does not match.
    pub fn matches_text(&self, candidate: &str) -> bool {
        let decoded = match &self.value {
            JsonValue::String(_) => JsonValue::String(candidate.to_string()),
            JsonValue::Number(_) => match candidate.trim().parse::<f64>() {
                Ok(n) => match serde_json::Number::from_f64(n) {
                    Some(n) => JsonValue::Number(n),
                    None => return false,
                },
                Err(_) => return false,
            },
            _ => match serde_json::from_str::<JsonValue>(candidate) {
                Ok(v) => v,
                Err(_) => return false,
            },
        };
        self.matches(&decoded)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field_name, self.op, self.value)
    }
}

/// True when every condition matches its field in `lookup`.
///
/// A field missing from `lookup` fails its condition.
pub fn matches_all<'a, F>(conditions: &[Condition], mut lookup: F) -> bool
where
    F: FnMut(&str) -> Option<&'a str>,
{
    conditions.iter().all(|c| {
        lookup(&c.field_name)
            .map(|text| c.matches_text(text))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(op: ConditionOp, value: JsonValue) -> Condition {
        Condition::new("f", op, value)
    }

    #[test]
    fn test_numeric_candidate_op_literal() {
        let cases = [
            (ConditionOp::Gt, 0, false),
            (ConditionOp::Gt, 2, true),
            (ConditionOp::Ge, 1, true),
            (ConditionOp::Ge, 0, false),
            (ConditionOp::Lt, 0, true),
            (ConditionOp::Lt, 2, false),
            (ConditionOp::Le, 1, true),
            (ConditionOp::Le, 2, false),
            (ConditionOp::Eq, 1, true),
            (ConditionOp::EqEq, 0, false),
            (ConditionOp::NotEq, 0, true),
            (ConditionOp::NotEq, 1, false),
        ];
        for (op, candidate, expected) in cases {
            assert_eq!(
                cond(op, json!(1)).matches(&json!(candidate)),
                expected,
                "{} {} 1",
                candidate,
                op
            );
        }
    }

    #[test]
    fn test_numeric_mixed_representation() {
        assert!(cond(ConditionOp::Eq, json!(1)).matches(&json!(1.0)));
        assert!(cond(ConditionOp::Lt, json!(2.5)).matches(&json!(2)));
        assert!(!cond(ConditionOp::Eq, json!(1)).matches(&json!("1")));
    }

    #[test]
    fn test_string_literal() {
        assert!(cond(ConditionOp::Eq, json!("abc")).matches(&json!("abc")));
        assert!(cond(ConditionOp::Gt, json!("abc")).matches(&json!("abd")));
        assert!(!cond(ConditionOp::Gt, json!("abc")).matches(&json!("abb")));
        assert!(!cond(ConditionOp::Eq, json!("1")).matches(&json!(1)));
    }

    #[test]
    fn test_bool_literal() {
        assert!(cond(ConditionOp::Eq, json!(true)).matches(&json!(true)));
        assert!(!cond(ConditionOp::Eq, json!(true)).matches(&json!(false)));
        assert!(cond(ConditionOp::NotEq, json!(false)).matches(&json!(true)));
        assert!(!cond(ConditionOp::Gt, json!(false)).matches(&json!(true)));
    }

    #[test]
    fn test_object_containment() {
        let c = cond(ConditionOp::Contains, json!({"a": 1, "b": [1, 2]}));
        assert!(c.matches(&json!({"a": 1, "b": [1, 2], "c": "x"})));
        assert!(!c.matches(&json!({"a": 1})));
        assert!(!c.matches(&json!({"a": 2, "b": [1, 2]})));
        assert!(!cond(ConditionOp::Eq, json!({"a": 1})).matches(&json!({"a": 1})));
    }

    #[test]
    fn test_null_literal() {
        assert!(cond(ConditionOp::Eq, JsonValue::Null).matches(&JsonValue::Null));
        assert!(!cond(ConditionOp::Eq, JsonValue::Null).matches(&json!(0)));
        assert!(cond(ConditionOp::NotEq, JsonValue::Null).matches(&json!("x")));
        assert!(!cond(ConditionOp::Lt, JsonValue::Null).matches(&JsonValue::Null));
    }

    #[test]
    fn test_matches_text() {
        assert!(Condition::eq("bucketStart", "1700000000").matches_text("1700000000"));
        assert!(cond(ConditionOp::Ge, json!(10)).matches_text("10.0"));
        assert!(!cond(ConditionOp::Ge, json!(10)).matches_text("ten"));
        assert!(cond(ConditionOp::Contains, json!({"k": "v"})).matches_text(r#"{"k":"v","x":1}"#));
        assert!(!cond(ConditionOp::Contains, json!({"k": "v"})).matches_text("not json"));
        assert!(cond(ConditionOp::Eq, json!(true)).matches_text("true"));
    }

    #[test]
    fn test_matches_all_missing_field() {
        let conditions = vec![Condition::eq("a", "1"), Condition::eq("b", "2")];
        assert!(matches_all(&conditions, |f| match f {
            "a" => Some("1"),
            "b" => Some("2"),
            _ => None,
        }));
        assert!(!matches_all(&conditions, |f| (f == "a").then_some("1")));
    }

    #[test]
    fn test_op_serde_and_negate() {
        let c = Condition::new("x", ConditionOp::Le, 5);
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({"fieldName": "x", "op": "<=", "value": 5})
        );
        assert_eq!(ConditionOp::Le.negate(), Some(ConditionOp::Gt));
        assert_eq!(ConditionOp::EqEq.negate(), Some(ConditionOp::NotEq));
        assert_eq!(ConditionOp::Contains.negate(), None);
        assert_eq!(ConditionOp::from_symbol(">="), Some(ConditionOp::Ge));
    }
}
