//! PostgreSQL store backend
//!
//! Repository implementations over `sqlx` using the runtime query API with
//! private row structs. Row-level locking on `entities` serializes
//! concurrent upserts to the same entity.

mod entity_store;
mod lock;
mod mapping_store;
mod sync_log;

pub use entity_store::PgEntityStore;
pub use lock::PgRunLock;
pub use mapping_store::PgMappingStore;
pub use sync_log::PgSyncLog;

use labsync_core::EntityType;

use crate::error::StoreError;

/// Decode a stored entity-type column.
fn parse_entity_type(raw: &str) -> Result<EntityType, StoreError> {
    raw.parse()
        .map_err(|e: String| StoreError::Database(sqlx::Error::Decode(e.into())))
}
