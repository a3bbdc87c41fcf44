//! Query client errors

use thiserror::Error;

/// Errors that can occur when talking to a Druid broker
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Druid unavailable: {0}")]
    Unavailable(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Base URL refresh failed: {0}")]
    UrlRefresh(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
