//! Post-aggregation expressions
//!
//! A post-aggregation tree is stored with every cached row as a flat prefix
//! token list so it can be recomputed after merging without the original
//! query at hand:
//!
//! ```text
//! arithmetic(/, [fieldAccess(sum), fieldAccess(count)])  =>  [op /, field sum, field count]
//! arithmetic(+, [a, b, c])                                =>  [op +, op +, field a, field b, field c]
//! ```
//!
//! Operators are binary except `neg`. Tokens are tagged, so a field named
//! `pow` or `"2"` is still a field.
//!
//! Arithmetic is carried out in `f64` and always yields `Float64`, like
//! Druid's arithmetic post-aggregator.

use crate::merge::error::{MergeError, MergeResult};
use crate::merge::value::{Event, Value};
use crate::query::PostAggregation;
use serde::{Deserialize, Serialize};

/// Arithmetic operator of a post-aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    /// Division where a zero divisor yields 0
    #[serde(rename = "/")]
    Div,
    /// Plain floating-point division
    #[serde(rename = "quotient")]
    Quotient,
    #[serde(rename = "pow")]
    Pow,
    /// Unary minus
    #[serde(rename = "neg")]
    Neg,
}

impl Operator {
    /// Binary operator for a Druid arithmetic `fn`
    pub fn from_fn(func: &str) -> Option<Self> {
        Some(match func {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "quotient" => Self::Quotient,
            "pow" => Self::Pow,
            _ => return None,
        })
    }

    fn apply(self, l: f64, r: f64) -> f64 {
        match self {
            Self::Add => l + r,
            Self::Sub => l - r,
            Self::Mul => l * r,
            Self::Div if r == 0.0 => 0.0,
            Self::Div | Self::Quotient => l / r,
            Self::Pow => l.powf(r),
            Self::Neg => -l,
        }
    }
}

/// One element of a prefix expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Token {
    Op(Operator),
    Field(String),
    Constant(f64),
}

impl Token {
    pub fn field(name: impl Into<String>) -> Self {
        Token::Field(name.into())
    }
}

/// Flatten a post-aggregation tree into prefix tokens.
///
/// n-ary arithmetic folds left into binary nodes. A single operand under `-`
/// becomes `neg`; under any other operator it is the operand itself.
pub fn flatten(post_aggregation: &PostAggregation) -> MergeResult<Vec<Token>> {
    let mut tokens = Vec::new();
    flatten_into(post_aggregation, &mut tokens)?;
    Ok(tokens)
}

fn flatten_into(node: &PostAggregation, tokens: &mut Vec<Token>) -> MergeResult<()> {
    match node {
        PostAggregation::FieldAccess { field_name, .. } => {
            tokens.push(Token::field(field_name.as_str()));
        }
        PostAggregation::Constant { value, .. } => {
            let constant = value.as_f64().ok_or_else(|| {
                MergeError::Expression(format!("constant {} is not a finite number", value))
            })?;
            tokens.push(Token::Constant(constant));
        }
        PostAggregation::Arithmetic { func, fields, .. } => {
            let op = Operator::from_fn(func).ok_or_else(|| {
                MergeError::Expression(format!("unknown arithmetic function `{}`", func))
            })?;
            match fields.len() {
                0 => {
                    return Err(MergeError::Expression(format!(
                        "arithmetic `{}` has no operands",
                        func
                    )))
                }
                1 if op == Operator::Sub => tokens.push(Token::Op(Operator::Neg)),
                n => tokens.extend(std::iter::repeat(Token::Op(op)).take(n - 1)),
            }
            for field in fields {
                flatten_into(field, tokens)?;
            }
        }
    }
    Ok(())
}

/// Evaluate a prefix token list against a row's values.
///
/// Returns `Ok(None)` when a referenced field is absent or null, so callers
/// can drop the stale result instead of failing.
pub fn evaluate(tokens: &[Token], bindings: &Event) -> MergeResult<Option<Value>> {
    let mut cursor = 0;
    let value = eval_at(tokens, &mut cursor, bindings)?;
    if cursor != tokens.len() {
        return Err(MergeError::Expression(format!(
            "{} trailing tokens in {:?}",
            tokens.len() - cursor,
            tokens
        )));
    }
    Ok(value.map(Value::Float64))
}

fn eval_at(tokens: &[Token], cursor: &mut usize, bindings: &Event) -> MergeResult<Option<f64>> {
    let token = tokens
        .get(*cursor)
        .ok_or_else(|| MergeError::Expression(format!("truncated expression {:?}", tokens)))?;
    *cursor += 1;

    match token {
        Token::Constant(c) => Ok(Some(*c)),
        Token::Field(name) => bindings
            .get(name)
            .filter(|v| !v.is_null())
            .map(as_number)
            .transpose(),
        Token::Op(Operator::Neg) => {
            let operand = eval_at(tokens, cursor, bindings)?;
            Ok(operand.map(|v| Operator::Neg.apply(v, 0.0)))
        }
        Token::Op(op) => {
            let left = eval_at(tokens, cursor, bindings)?;
            let right = eval_at(tokens, cursor, bindings)?;
            Ok(left.zip(right).map(|(l, r)| op.apply(l, r)))
        }
    }
}

fn as_number(value: &Value) -> MergeResult<f64> {
    value.as_f64().ok_or(MergeError::UnsupportedOperand {
        op: "arithmetic",
        kind: value.kind(),
    })
}
