//! Error types for the polling core.

use thiserror::Error;

/// Why a fetch (or the interpretation of its result) did not produce data.
///
/// Fetch errors are recorded on the cache that issued the fetch; they never
/// propagate to the scheduler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The collaborator reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The collaborator gave up waiting on its backend.
    #[error("fetch timed out")]
    Timeout,

    /// The fetch function panicked.
    #[error("fetch panicked: {0}")]
    Panicked(String),

    /// The status interpreter panicked while judging fetched data.
    #[error("status check failed: {0}")]
    Interpretation(String),
}

impl FetchError {
    pub fn failed(message: impl Into<String>) -> Self {
        FetchError::Failed(message.into())
    }
}

impl From<String> for FetchError {
    fn from(message: String) -> Self {
        FetchError::Failed(message)
    }
}

impl From<&str> for FetchError {
    fn from(message: &str) -> Self {
        FetchError::Failed(message.to_string())
    }
}

/// Errors surfaced to callers of manual, interactive operations.
#[derive(Debug, Error)]
pub enum PollError {
    /// No registered node matches the requested type and key.
    #[error("no {node_type} node registered with key '{key}'")]
    NodeNotFound { node_type: String, key: String },

    /// The background scan loop stopped abnormally.
    #[error("polling loop failed: {0}")]
    SchedulerFailed(String),

    /// A snapshot output could not be written.
    #[error("output failed: {0}")]
    Output(#[from] std::io::Error),
}

/// Best-effort text from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
