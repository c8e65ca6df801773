//! Error types for the task registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by registry mutations. All of them leave the registry
/// unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cluster already registered: {0}")]
    ClusterExists(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("task already registered: {0}")]
    TaskExists(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),
}
