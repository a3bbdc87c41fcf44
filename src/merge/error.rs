//! Merge error types
//!
//! Compatibility failures are reported before any rows are touched. The
//! remaining variants are contract violations: they mean a caller or the
//! data schema is wrong, and the merge aborts instead of degrading.

use crate::merge::value::ValueKind;
use thiserror::Error;

/// Errors raised by the merge algebra and the merge-join
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    /// The two queries differ in a field that must be identical
    #[error("Queries are not merge compatible: {0} differs")]
    Incompatible(String),

    /// Only granularity `all` results can be merged
    #[error("Only granularity `all` results can be merged")]
    GranularityNotAll,

    /// Aggregation type outside the count/sum/min/max family
    #[error("Aggregation type `{0}` is not supported for merge")]
    UnsupportedAggregation(String),

    /// Operands of different kinds
    #[error("Type mismatch: {left} vs {right}")]
    TypeMismatch { left: ValueKind, right: ValueKind },

    /// Operation undefined for this kind of operand
    #[error("Cannot apply {op} to {kind} values")]
    UnsupportedOperand { op: &'static str, kind: ValueKind },

    /// Operands that have no ordering
    #[error("Values are not comparable: {left} vs {right}")]
    Incomparable { left: ValueKind, right: ValueKind },

    /// Two rows compared equal but one lacks a group-by key
    #[error("Rows compare equal but dimension `{0}` is missing")]
    MissingDimension(String),

    /// Integer arithmetic overflowed its width
    #[error("Integer overflow in {0}")]
    Overflow(String),

    /// Post-aggregation expression could not be built or evaluated
    #[error("Expression error: {0}")]
    Expression(String),

    /// The same bucket was folded into one result twice
    #[error("Bucket {0} was already merged")]
    DuplicateBucket(String),
}

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MergeError::TypeMismatch {
            left: ValueKind::Int32,
            right: ValueKind::Float64,
        };
        assert_eq!(err.to_string(), "Type mismatch: int32 vs float64");

        let err = MergeError::UnsupportedAggregation("cardinality".to_string());
        assert_eq!(
            err.to_string(),
            "Aggregation type `cardinality` is not supported for merge"
        );
    }
}
