//! Store error types.

use labsync_core::{EntityType, ExternalId, SyncRunId};
use thiserror::Error;

/// Errors from the internal store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced row does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// An identity mapping for this key already exists with a different
    /// internal id.
    #[error("mapping for ({entity_type}, {external_id}) already exists")]
    DuplicateMapping {
        entity_type: EntityType,
        external_id: ExternalId,
    },

    /// A sync run already reached a terminal state and cannot be updated.
    #[error("sync run {run_id} is already finalized")]
    RunFinalized { run_id: SyncRunId },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Shorthand for a not-found error.
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
