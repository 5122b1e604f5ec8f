//! Identity Mapper
//!
//! Durable mapping between external record identifiers and internal entity
//! identifiers, per entity type. `resolve` never mutates; `bind` detects
//! split-brain (two external records claiming one identity key) and
//! refuses to overwrite; `touch` feeds staleness detection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use labsync_core::{EntityId, EntityType, ExternalId, TenantId};
use labsync_store::{IdentityMapping, MappingStore, StoreError};

use crate::error::{SyncError, SyncResult};

/// Mapping service for one tenant.
#[derive(Clone)]
pub struct IdentityMapper {
    tenant_id: TenantId,
    store: Arc<dyn MappingStore>,
}

impl IdentityMapper {
    /// Create a mapper over the given store.
    pub fn new(tenant_id: TenantId, store: Arc<dyn MappingStore>) -> Self {
        Self { tenant_id, store }
    }

    /// The tenant this mapper is scoped to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Pure lookup of the internal id bound to an external id.
    pub async fn resolve(
        &self,
        entity_type: EntityType,
        external_id: &ExternalId,
    ) -> SyncResult<Option<EntityId>> {
        let mapping = self.store.find(self.tenant_id, entity_type, external_id).await?;
        Ok(mapping.map(|m| m.internal_id))
    }

    /// Create a mapping.
    ///
    /// Binding an already-bound key to the *same* internal id is a no-op;
    /// binding it to a different one fails with
    /// [`SyncError::MappingConflict`] and leaves the prior mapping intact.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub async fn bind(
        &self,
        entity_type: EntityType,
        external_id: &ExternalId,
        internal_id: EntityId,
    ) -> SyncResult<()> {
        if let Some(existing) = self.store.find(self.tenant_id, entity_type, external_id).await? {
            if existing.internal_id == internal_id {
                return Ok(());
            }
            warn!(
                entity_type = %entity_type,
                external_id = %external_id,
                existing = %existing.internal_id,
                incoming = %internal_id,
                "identity mapping conflict"
            );
            return Err(SyncError::MappingConflict {
                entity_type,
                external_id: external_id.clone(),
                existing: existing.internal_id,
                incoming: internal_id,
            });
        }

        let mapping =
            IdentityMapping::new(self.tenant_id, entity_type, external_id.clone(), internal_id);

        match self.store.insert(mapping).await {
            Ok(()) => Ok(()),
            // Lost a race with a concurrent bind: re-read and compare.
            Err(StoreError::DuplicateMapping { .. }) => {
                match self.store.find(self.tenant_id, entity_type, external_id).await? {
                    Some(existing) if existing.internal_id == internal_id => Ok(()),
                    Some(existing) => Err(SyncError::MappingConflict {
                        entity_type,
                        external_id: external_id.clone(),
                        existing: existing.internal_id,
                        incoming: internal_id,
                    }),
                    None => Err(StoreError::not_found("mapping", external_id).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record that a sync pass saw this external record.
    pub async fn touch(
        &self,
        entity_type: EntityType,
        external_id: &ExternalId,
    ) -> SyncResult<()> {
        self.store.touch(self.tenant_id, entity_type, external_id).await?;
        Ok(())
    }

    /// Mappings no pull has refreshed since `older_than` — candidates for
    /// deactivation, surfaced for reconciliation, never deleted here.
    pub async fn stale_candidates(
        &self,
        entity_type: EntityType,
        older_than: DateTime<Utc>,
    ) -> SyncResult<Vec<IdentityMapping>> {
        Ok(self.store.list_stale(self.tenant_id, entity_type, older_than).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_store::InMemoryStore;

    fn mapper() -> (IdentityMapper, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (IdentityMapper::new(TenantId::new(), store.clone()), store)
    }

    #[tokio::test]
    async fn test_resolve_unknown_is_none() {
        let (mapper, _) = mapper();
        let resolved = mapper
            .resolve(EntityType::Service, &ExternalId::from_numeric(2))
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_bind_then_resolve() {
        let (mapper, _) = mapper();
        let internal = EntityId::new();
        let external = ExternalId::from_numeric(2);

        mapper.bind(EntityType::Service, &external, internal).await.unwrap();
        let resolved = mapper.resolve(EntityType::Service, &external).await.unwrap();
        assert_eq!(resolved, Some(internal));
    }

    #[tokio::test]
    async fn test_rebinding_same_id_is_noop() {
        let (mapper, _) = mapper();
        let internal = EntityId::new();
        let external = ExternalId::from_numeric(2);

        mapper.bind(EntityType::Service, &external, internal).await.unwrap();
        mapper.bind(EntityType::Service, &external, internal).await.unwrap();
    }

    #[tokio::test]
    async fn test_conflicting_bind_keeps_prior_mapping() {
        let (mapper, _) = mapper();
        let first = EntityId::new();
        let second = EntityId::new();
        let external = ExternalId::from_numeric(2);

        mapper.bind(EntityType::Service, &external, first).await.unwrap();
        let err = mapper
            .bind(EntityType::Service, &external, second)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MappingConflict { .. }));

        let resolved = mapper.resolve(EntityType::Service, &external).await.unwrap();
        assert_eq!(resolved, Some(first));
    }

    #[tokio::test]
    async fn test_same_external_id_in_different_types_is_independent() {
        let (mapper, _) = mapper();
        let external = ExternalId::from_numeric(2);

        mapper
            .bind(EntityType::Service, &external, EntityId::new())
            .await
            .unwrap();
        mapper
            .bind(EntityType::Clinic, &external, EntityId::new())
            .await
            .unwrap();
    }
}
