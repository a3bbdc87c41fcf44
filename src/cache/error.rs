//! Cache error types

use thiserror::Error;

/// A query interval that cannot be decomposed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntervalError {
    #[error("Invalid interval `{interval}`: {reason}")]
    Parse { interval: String, reason: String },
}

impl IntervalError {
    pub(crate) fn parse(interval: &str, reason: impl Into<String>) -> Self {
        IntervalError::Parse {
            interval: interval.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by cache stores
#[derive(Error, Debug)]
pub enum CacheError {
    /// Store backend failure
    #[error("Cache store error: {0}")]
    Store(String),

    /// Cached data does not have the expected shape
    #[error("Corrupt cache row: {0}")]
    Corrupt(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for cache store operations
pub type CacheResult<T> = Result<T, CacheError>;
