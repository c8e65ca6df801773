//! Metrics query error types.

use thiserror::Error;

/// Result type alias for metrics queries.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors that can occur while querying a ResourceManager.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("connection to {0} failed: {1}")]
    Connect(String, String),

    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected status {status} from {uri}")]
    Status { status: u16, uri: String },

    #[error("failed to decode response from {uri}: {reason}")]
    Decode { uri: String, reason: String },

    #[error("query to {0} timed out")]
    Timeout(String),
}
