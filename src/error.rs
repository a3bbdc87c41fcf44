//! Crate-level error type

use crate::cache::{CacheError, IntervalError};
use crate::client::ClientError;
use crate::config::ConfigError;
use crate::merge::MergeError;
use crate::query::ConditionError;
use thiserror::Error;

/// Any failure of a druidkit operation
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Interval(#[from] IntervalError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
