//! Query error types
//!
//! Raised when a filter cannot be expressed as a flat list of conditions.

use thiserror::Error;

/// Errors that can occur while translating filters to conditions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    /// Filter type has no condition form (`or`, `regex`, `javascript`, ...)
    #[error("Unsupported filter type: {0}")]
    Unsupported(String),

    /// `not` over something that is not a single reversible condition
    #[error("Cannot negate filter: {0}")]
    NotReversible(String),
}

/// Result type for condition translation
pub type ConditionResult<T> = Result<T, ConditionError>;
