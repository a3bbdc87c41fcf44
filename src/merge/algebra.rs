//! Generic merge algebra
//!
//! Arithmetic over [`Value`] pairs. Every operator is defined once per
//! numeric width through the macros below and requires both operands to be
//! of the same kind: a width or signedness mismatch means the two inputs did
//! not come from the same schema, so it is reported instead of coerced.
//!
//! | operator   | integers              | floats          |
//! |------------|-----------------------|-----------------|
//! | `sum`      | checked, same width   | same width      |
//! | `sub`      | checked, same width   | same width      |
//! | `multiply` | checked, widened to 64 | same width     |
//! | `divide`   | `Float64`, 0 on x/0   | same width, 0 on x/0 |
//! | `min/max`  | same width            | same width      |

use crate::merge::compare::compare;
use crate::merge::error::{MergeError, MergeResult};
use crate::merge::value::Value;
use std::cmp::Ordering;

/// How two partial aggregates of one aggregation combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    Sum,
    Min,
    Max,
}

fn mismatch(op: &'static str, a: &Value, b: &Value) -> MergeError {
    if a.kind() == b.kind() {
        MergeError::UnsupportedOperand { op, kind: a.kind() }
    } else {
        MergeError::TypeMismatch {
            left: a.kind(),
            right: b.kind(),
        }
    }
}

macro_rules! checked_same_width {
    ($op:literal, $a:expr, $b:expr, $method:ident, $float_op:tt) => {
        match ($a, $b) {
            (Value::Int8(x), Value::Int8(y)) => x.$method(*y).map(Value::Int8),
            (Value::Int16(x), Value::Int16(y)) => x.$method(*y).map(Value::Int16),
            (Value::Int32(x), Value::Int32(y)) => x.$method(*y).map(Value::Int32),
            (Value::Int64(x), Value::Int64(y)) => x.$method(*y).map(Value::Int64),
            (Value::UInt8(x), Value::UInt8(y)) => x.$method(*y).map(Value::UInt8),
            (Value::UInt16(x), Value::UInt16(y)) => x.$method(*y).map(Value::UInt16),
            (Value::UInt32(x), Value::UInt32(y)) => x.$method(*y).map(Value::UInt32),
            (Value::UInt64(x), Value::UInt64(y)) => x.$method(*y).map(Value::UInt64),
            (Value::Float32(x), Value::Float32(y)) => Some(Value::Float32(x $float_op y)),
            (Value::Float64(x), Value::Float64(y)) => Some(Value::Float64(x $float_op y)),
            (a, b) => return Err(mismatch($op, a, b)),
        }
        .ok_or_else(|| MergeError::Overflow($op.to_string()))
    };
}

/// `a + b`
pub fn sum(a: &Value, b: &Value) -> MergeResult<Value> {
    checked_same_width!("sum", a, b, checked_add, +)
}

/// `a - b`
pub fn sub(a: &Value, b: &Value) -> MergeResult<Value> {
    checked_same_width!("sub", a, b, checked_sub, -)
}

/// `a * b`; integer products are widened to 64 bits of the same signedness
pub fn multiply(a: &Value, b: &Value) -> MergeResult<Value> {
    let signed = |x: i64, y: i64| x.checked_mul(y).map(Value::Int64);
    let unsigned = |x: u64, y: u64| x.checked_mul(y).map(Value::UInt64);

    match (a, b) {
        (Value::Int8(x), Value::Int8(y)) => signed(*x as i64, *y as i64),
        (Value::Int16(x), Value::Int16(y)) => signed(*x as i64, *y as i64),
        (Value::Int32(x), Value::Int32(y)) => signed(*x as i64, *y as i64),
        (Value::Int64(x), Value::Int64(y)) => signed(*x, *y),
        (Value::UInt8(x), Value::UInt8(y)) => unsigned(*x as u64, *y as u64),
        (Value::UInt16(x), Value::UInt16(y)) => unsigned(*x as u64, *y as u64),
        (Value::UInt32(x), Value::UInt32(y)) => unsigned(*x as u64, *y as u64),
        (Value::UInt64(x), Value::UInt64(y)) => unsigned(*x, *y),
        (Value::Float32(x), Value::Float32(y)) => Some(Value::Float32(x * y)),
        (Value::Float64(x), Value::Float64(y)) => Some(Value::Float64(x * y)),
        (a, b) => return Err(mismatch("multiply", a, b)),
    }
    .ok_or_else(|| MergeError::Overflow("multiply".to_string()))
}

/// `a / b`; integer quotients are `Float64` and a zero divisor yields 0
pub fn divide(a: &Value, b: &Value) -> MergeResult<Value> {
    match (a, b) {
        (Value::Float32(x), Value::Float32(y)) => {
            Ok(Value::Float32(if *y == 0.0 { 0.0 } else { x / y }))
        }
        (Value::Float64(x), Value::Float64(y)) => {
            Ok(Value::Float64(if *y == 0.0 { 0.0 } else { x / y }))
        }
        (a, b) if a.kind() == b.kind() && a.kind().is_numeric() => {
            // same-kind integers; as_f64 is total for numeric kinds
            let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            Ok(Value::Float64(if y == 0.0 { 0.0 } else { x / y }))
        }
        (a, b) => Err(mismatch("divide", a, b)),
    }
}

/// The smaller of two same-kind values (numbers or strings)
pub fn min(a: &Value, b: &Value) -> MergeResult<Value> {
    ensure_orderable("min", a, b)?;
    Ok(match compare(a, b)? {
        Ordering::Greater => b.clone(),
        _ => a.clone(),
    })
}

/// The larger of two same-kind values (numbers or strings)
pub fn max(a: &Value, b: &Value) -> MergeResult<Value> {
    ensure_orderable("max", a, b)?;
    Ok(match compare(a, b)? {
        Ordering::Less => b.clone(),
        _ => a.clone(),
    })
}

fn ensure_orderable(op: &'static str, a: &Value, b: &Value) -> MergeResult<()> {
    if a.kind() != b.kind() {
        return Err(mismatch(op, a, b));
    }
    if a.kind().is_numeric() || a.kind() == crate::merge::value::ValueKind::String {
        Ok(())
    } else {
        Err(mismatch(op, a, b))
    }
}

/// Combine two partial aggregates.
///
/// A null or missing side contributes nothing: the other side is returned
/// unchanged.
pub fn merge_values(kind: MergeKind, a: &Value, b: &Value) -> MergeResult<Value> {
    if a.is_null() {
        return Ok(b.clone());
    }
    if b.is_null() {
        return Ok(a.clone());
    }

    match kind {
        MergeKind::Sum => sum(a, b),
        MergeKind::Min => min(a, b),
        MergeKind::Max => max(a, b),
    }
}
