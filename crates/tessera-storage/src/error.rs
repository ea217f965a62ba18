//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error (transient, retriable).
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error (transient, retriable).
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Invalid filter error.
    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Whether the error is transient and the operation may be retried.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionError { .. } | StorageError::QueryError { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
