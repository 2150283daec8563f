//! Fetch Error Types

use thiserror::Error;

/// Errors that can occur while fetching observations
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out
    #[error("Timeout waiting for upstream response")]
    Timeout,

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// Response body could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Too many stations in one request
    #[error("Batch of {requested} stations exceeds limit of {max}")]
    BatchTooLarge { requested: usize, max: usize },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(err.to_string())
        }
    }
}
