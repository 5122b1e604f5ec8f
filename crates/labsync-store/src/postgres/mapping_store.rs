//! Identity mapping repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use labsync_core::{EntityId, EntityType, ExternalId, TenantId};

use crate::error::{StoreError, StoreResult};
use crate::mapping::IdentityMapping;
use crate::traits::MappingStore;

use super::parse_entity_type;

const MAPPING_COLUMNS: &str =
    "tenant_id, entity_type, external_id, internal_id, created_at, last_synced_at";

/// PostgreSQL-backed mapping store.
#[derive(Debug, Clone)]
pub struct PgMappingStore {
    pool: PgPool,
}

impl PgMappingStore {
    /// Create a store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingStore for PgMappingStore {
    #[instrument(skip(self))]
    async fn find(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        external_id: &ExternalId,
    ) -> StoreResult<Option<IdentityMapping>> {
        let row = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM identity_mappings \
             WHERE tenant_id = $1 AND entity_type = $2 AND external_id = $3"
        ))
        .bind(tenant_id.as_uuid())
        .bind(entity_type.as_str())
        .bind(external_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MappingRow::into_mapping).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_internal(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        internal_id: EntityId,
    ) -> StoreResult<Option<IdentityMapping>> {
        let row = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM identity_mappings \
             WHERE tenant_id = $1 AND entity_type = $2 AND internal_id = $3 \
             LIMIT 1"
        ))
        .bind(tenant_id.as_uuid())
        .bind(entity_type.as_str())
        .bind(internal_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MappingRow::into_mapping).transpose()
    }

    #[instrument(skip(self, mapping), fields(external_id = %mapping.external_id))]
    async fn insert(&self, mapping: IdentityMapping) -> StoreResult<()> {
        // The primary key makes conflicting inserts a no-op so the prior
        // mapping is never overwritten; zero affected rows means the key
        // was already bound.
        let inserted = sqlx::query(
            "INSERT INTO identity_mappings \
             (tenant_id, entity_type, external_id, internal_id, created_at, last_synced_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (tenant_id, entity_type, external_id) DO NOTHING",
        )
        .bind(mapping.tenant_id.as_uuid())
        .bind(mapping.entity_type.as_str())
        .bind(mapping.external_id.as_str())
        .bind(mapping.internal_id.as_uuid())
        .bind(mapping.created_at)
        .bind(mapping.last_synced_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::DuplicateMapping {
                entity_type: mapping.entity_type,
                external_id: mapping.external_id,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn touch(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        external_id: &ExternalId,
    ) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE identity_mappings SET last_synced_at = NOW() \
             WHERE tenant_id = $1 AND entity_type = $2 AND external_id = $3",
        )
        .bind(tenant_id.as_uuid())
        .bind(entity_type.as_str())
        .bind(external_id.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("mapping", external_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_stale(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<IdentityMapping>> {
        let rows = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM identity_mappings \
             WHERE tenant_id = $1 AND entity_type = $2 AND last_synced_at < $3 \
             ORDER BY last_synced_at"
        ))
        .bind(tenant_id.as_uuid())
        .bind(entity_type.as_str())
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MappingRow::into_mapping).collect()
    }
}

/// Database row for an identity mapping.
#[derive(Debug, sqlx::FromRow)]
struct MappingRow {
    tenant_id: Uuid,
    entity_type: String,
    external_id: String,
    internal_id: Uuid,
    created_at: DateTime<Utc>,
    last_synced_at: DateTime<Utc>,
}

impl MappingRow {
    fn into_mapping(self) -> StoreResult<IdentityMapping> {
        Ok(IdentityMapping {
            tenant_id: TenantId::from_uuid(self.tenant_id),
            entity_type: parse_entity_type(&self.entity_type)?,
            external_id: ExternalId::new(self.external_id),
            internal_id: EntityId::from_uuid(self.internal_id),
            created_at: self.created_at,
            last_synced_at: self.last_synced_at,
        })
    }
}
