//! Domain error types for check resolution.

use thiserror::Error;

use tessera_storage::StorageError;

/// Domain-specific errors for check resolution.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Storage operation failed. Transient storage errors surface with
    /// their original cause so the transport can map them.
    #[error("storage operation failed: {0}")]
    Storage(#[from] StorageError),

    /// Type not found in authorization model.
    #[error("type not found: {type_name}")]
    TypeNotFound { type_name: String },

    /// Relation not found on type.
    #[error("relation '{relation}' not found on type '{type_name}'")]
    RelationNotFound { type_name: String, relation: String },

    /// Authorization model not found for store during resolution.
    #[error("authorization model '{model_id}' not found for store: {store_id}")]
    AuthorizationModelNotFound { store_id: String, model_id: String },

    /// Malformed authorization model (should have been caught upstream).
    #[error("invalid authorization model: {message}")]
    InvalidModel { message: String },

    /// Malformed tuple key in a request.
    #[error("invalid tuple key: {message}")]
    InvalidTupleKey { message: String },

    /// Resolution depth exceeded during graph traversal.
    #[error("resolution depth exceeded (limit: {limit})")]
    ResolutionDepthExceeded { limit: u32 },

    /// The check was cancelled before an answer was determined.
    #[error("check cancelled before a result was determined")]
    Canceled,

    /// The caller's deadline elapsed.
    #[error("check deadline exceeded after {duration_ms}ms")]
    DeadlineExceeded { duration_ms: u64 },

    /// Internal error: cache-key hash failure, type-system inconsistency.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub(crate) fn invalid_tuple_key(err: StorageError) -> Self {
        DomainError::InvalidTupleKey {
            message: err.to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
