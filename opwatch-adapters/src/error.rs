//! Error types for adapters.

use opwatch_core::FetchError;
use thiserror::Error;

/// Errors raised while talking to a backend.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The request failed or the server answered with an error status.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The response body was not what was expected.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else if err.is_decode() {
            AdapterError::Parse(err.to_string())
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}

impl From<AdapterError> for FetchError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Timeout => FetchError::Timeout,
            other => FetchError::Failed(other.to_string()),
        }
    }
}
