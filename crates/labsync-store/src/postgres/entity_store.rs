//! Entity repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use labsync_core::{EntityId, EntityType, TenantId};

use crate::entity::{ExternalFields, InternalEntity, SecondaryKey};
use crate::error::{StoreError, StoreResult};
use crate::traits::EntityStore;

use super::parse_entity_type;

const ENTITY_COLUMNS: &str = "id, tenant_id, entity_type, name, email, phone, price, active, \
                              reference, notes, created_at, updated_at";

/// PostgreSQL-backed entity store.
#[derive(Debug, Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    /// Create a store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    #[instrument(skip(self))]
    async fn get(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        id: EntityId,
    ) -> StoreResult<Option<InternalEntity>> {
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE tenant_id = $1 AND entity_type = $2 AND id = $3"
        ))
        .bind(tenant_id.as_uuid())
        .bind(entity_type.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntityRow::into_entity).transpose()
    }

    #[instrument(skip(self, value))]
    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        key: SecondaryKey,
        value: &str,
    ) -> StoreResult<Option<InternalEntity>> {
        // key.field_name() is a fixed column name, never user input
        let row = sqlx::query_as::<_, EntityRow>(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities \
             WHERE tenant_id = $1 AND entity_type = $2 AND {} = $3 \
             ORDER BY created_at \
             LIMIT 1",
            key.field_name()
        ))
        .bind(tenant_id.as_uuid())
        .bind(entity_type.as_str())
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EntityRow::into_entity).transpose()
    }

    #[instrument(skip(self, fields))]
    async fn upsert(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        id: Option<EntityId>,
        fields: ExternalFields,
    ) -> StoreResult<EntityId> {
        let fields = fields.normalized();
        match id {
            Some(id) => {
                let updated = sqlx::query(
                    "UPDATE entities \
                     SET name = $4, email = $5, phone = $6, price = $7, active = $8, \
                         reference = $9, updated_at = NOW() \
                     WHERE tenant_id = $1 AND entity_type = $2 AND id = $3",
                )
                .bind(tenant_id.as_uuid())
                .bind(entity_type.as_str())
                .bind(id.as_uuid())
                .bind(&fields.name)
                .bind(&fields.email)
                .bind(&fields.phone)
                .bind(fields.price)
                .bind(fields.active)
                .bind(&fields.reference)
                .execute(&self.pool)
                .await?;

                if updated.rows_affected() == 0 {
                    return Err(StoreError::not_found("entity", id));
                }
                Ok(id)
            }
            None => {
                let id = EntityId::new();
                sqlx::query(
                    "INSERT INTO entities \
                     (id, tenant_id, entity_type, name, email, phone, price, active, reference) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(id.as_uuid())
                .bind(tenant_id.as_uuid())
                .bind(entity_type.as_str())
                .bind(&fields.name)
                .bind(&fields.email)
                .bind(&fields.phone)
                .bind(fields.price)
                .bind(fields.active)
                .bind(&fields.reference)
                .execute(&self.pool)
                .await?;
                Ok(id)
            }
        }
    }

    #[instrument(skip(self))]
    async fn count(&self, tenant_id: TenantId, entity_type: EntityType) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entities WHERE tenant_id = $1 AND entity_type = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(entity_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// Database row for an entity.
#[derive(Debug, sqlx::FromRow)]
struct EntityRow {
    id: Uuid,
    tenant_id: Uuid,
    entity_type: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    price: Option<Decimal>,
    active: bool,
    reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EntityRow {
    fn into_entity(self) -> StoreResult<InternalEntity> {
        Ok(InternalEntity {
            id: EntityId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            entity_type: parse_entity_type(&self.entity_type)?,
            external: ExternalFields {
                name: self.name,
                email: self.email,
                phone: self.phone,
                price: self.price,
                active: self.active,
                reference: self.reference,
            },
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
