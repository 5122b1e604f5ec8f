//! Engine error types.
//!
//! Record-level errors are tallied and never abort a batch; run-level
//! errors (authentication, malformed filters) fail the whole run. The
//! synchronizer decides by phase, this module carries the context.

use labsync_core::{EntityId, EntityType, ExternalId};
use labsync_erp::ErpError;
use labsync_store::StoreError;
use thiserror::Error;

/// Errors raised by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// ERP adapter failure.
    #[error(transparent)]
    Erp(#[from] ErpError),

    /// Internal store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Two external records claim the same identity key.
    ///
    /// The prior mapping is left untouched; the record is skipped and the
    /// run marked partial.
    #[error(
        "identity mapping conflict for ({entity_type}, {external_id}): \
         bound to {existing}, refusing to rebind to {incoming}"
    )]
    MappingConflict {
        entity_type: EntityType,
        external_id: ExternalId,
        existing: EntityId,
        incoming: EntityId,
    },

    /// A remote record is missing or malforms a required field.
    #[error("invalid {entity_kind} record {external_id}: field '{field}': {message}")]
    Validation {
        entity_kind: String,
        external_id: ExternalId,
        field: &'static str,
        message: String,
    },

    /// A run for this module is already in flight; the request is rejected
    /// up front, never queued.
    #[error("sync for module '{module}' is already running")]
    Busy { module: String },

    /// The run was cancelled cooperatively between records.
    #[error("run cancelled before completion")]
    Cancelled,

    /// No synchronizer is registered under this module name.
    #[error("unknown sync module '{module}'")]
    UnknownModule { module: String },
}

impl SyncError {
    /// Shorthand for a validation error.
    pub fn validation(
        entity_kind: impl Into<String>,
        external_id: ExternalId,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        SyncError::Validation {
            entity_kind: entity_kind.into(),
            external_id,
            field,
            message: message.into(),
        }
    }

    /// Whether this error affects a single record rather than the run.
    #[must_use]
    pub fn is_record_level(&self) -> bool {
        match self {
            SyncError::Validation { .. } | SyncError::MappingConflict { .. } => true,
            SyncError::Erp(e) => !e.is_auth_error(),
            SyncError::Store(_) => true,
            SyncError::Busy { .. }
            | SyncError::Cancelled
            | SyncError::UnknownModule { .. } => false,
        }
    }
}

/// Result alias for engine operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
