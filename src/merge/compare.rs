//! Typed comparison of values and dimension tuples

use crate::merge::error::{MergeError, MergeResult};
use crate::merge::value::{Event, Value};
use std::cmp::Ordering;

/// Compare two values of the same kind.
///
/// Values of different kinds, JSON payloads that differ, and NaN floats have
/// no ordering and are reported as [`MergeError::Incomparable`].
pub fn compare(a: &Value, b: &Value) -> MergeResult<Ordering> {
    let ordering = match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Int8(x), Value::Int8(y)) => Some(x.cmp(y)),
        (Value::Int16(x), Value::Int16(y)) => Some(x.cmp(y)),
        (Value::Int32(x), Value::Int32(y)) => Some(x.cmp(y)),
        (Value::Int64(x), Value::Int64(y)) => Some(x.cmp(y)),
        (Value::UInt8(x), Value::UInt8(y)) => Some(x.cmp(y)),
        (Value::UInt16(x), Value::UInt16(y)) => Some(x.cmp(y)),
        (Value::UInt32(x), Value::UInt32(y)) => Some(x.cmp(y)),
        (Value::UInt64(x), Value::UInt64(y)) => Some(x.cmp(y)),
        (Value::Float32(x), Value::Float32(y)) => x.partial_cmp(y),
        (Value::Float64(x), Value::Float64(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Json(x), Value::Json(y)) if x == y => Some(Ordering::Equal),
        _ => None,
    };

    ordering.ok_or(MergeError::Incomparable {
        left: a.kind(),
        right: b.kind(),
    })
}

/// Compare two events by the values stored under `keys`, in order.
///
/// A key that is absent on the left only sorts the left event first; absent
/// on the right only sorts it last; absent on both sides moves on to the next
/// key. A present null is a group of its own: it sorts before every other
/// value and equals another null.
pub fn compare_events(keys: &[String], a: &Event, b: &Event) -> MergeResult<Ordering> {
    for key in keys {
        let ordering = match (a.get(key), b.get(key)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(l), Some(r)) => match (l.is_null(), r.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => compare(l, r)?,
            },
        };
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }

    Ok(Ordering::Equal)
}
