//! Identity mapping model.

use chrono::{DateTime, Utc};
use labsync_core::{EntityId, EntityType, ExternalId, TenantId};
use serde::{Deserialize, Serialize};

/// Durable link between an external record and an internal entity.
///
/// At most one internal id per `(tenant, entity_type, external_id)`; the
/// store enforces this and mappings are never deleted automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMapping {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Entity kind this mapping belongs to.
    pub entity_type: EntityType,
    /// Identifier in the ERP.
    pub external_id: ExternalId,
    /// Identifier in the internal store.
    pub internal_id: EntityId,
    /// When the mapping was first created.
    pub created_at: DateTime<Utc>,
    /// Last time a sync pass saw this external record.
    ///
    /// Mappings whose `last_synced_at` falls behind are deactivation
    /// candidates for a reconciliation pass; the fast path never deletes.
    pub last_synced_at: DateTime<Utc>,
}

impl IdentityMapping {
    /// Create a fresh mapping stamped with the current time.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        entity_type: EntityType,
        external_id: ExternalId,
        internal_id: EntityId,
    ) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            entity_type,
            external_id,
            internal_id,
            created_at: now,
            last_synced_at: now,
        }
    }
}
