//! In-memory store
//!
//! Implements every store trait over a single locked state. Used as the
//! test double for the engine and for embedded/demo deployments. The state
//! lock also serializes concurrent writes to the same entity, matching the
//! contract the PostgreSQL backend gets from row-level locking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use labsync_core::{EntityId, EntityType, ExternalId, SyncRunId, TenantId};

use crate::entity::{ExternalFields, InternalEntity, SecondaryKey};
use crate::error::{StoreError, StoreResult};
use crate::mapping::IdentityMapping;
use crate::run::{RunOutcome, SyncRun};
use crate::traits::{EntityStore, MappingStore, SyncLogStore};

#[derive(Debug, Default)]
struct State {
    entities: HashMap<(TenantId, EntityType, EntityId), InternalEntity>,
    mappings: HashMap<(TenantId, EntityType, ExternalId), IdentityMapping>,
    runs: Vec<SyncRun>,
}

/// In-memory implementation of the store traits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entity writes performed so far.
    ///
    /// Lets tests assert that re-running a synchronizer with unchanged
    /// remote data performs zero writes.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Insert a pre-built entity, for test seeding.
    pub async fn seed_entity(&self, entity: InternalEntity) -> EntityId {
        let id = entity.id;
        let mut state = self.state.write().await;
        state
            .entities
            .insert((entity.tenant_id, entity.entity_type, id), entity);
        id
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        id: EntityId,
    ) -> StoreResult<Option<InternalEntity>> {
        let state = self.state.read().await;
        Ok(state.entities.get(&(tenant_id, entity_type, id)).cloned())
    }

    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        key: SecondaryKey,
        value: &str,
    ) -> StoreResult<Option<InternalEntity>> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .values()
            .find(|e| {
                e.tenant_id == tenant_id
                    && e.entity_type == entity_type
                    && e.external.key_value(key) == Some(value)
            })
            .cloned())
    }

    async fn upsert(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        id: Option<EntityId>,
        fields: ExternalFields,
    ) -> StoreResult<EntityId> {
        let mut state = self.state.write().await;
        match id {
            Some(id) => {
                let entity = state
                    .entities
                    .get_mut(&(tenant_id, entity_type, id))
                    .ok_or_else(|| StoreError::not_found("entity", id))?;
                entity.external = fields.normalized();
                entity.updated_at = Utc::now();
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(id)
            }
            None => {
                let entity = InternalEntity::new(tenant_id, entity_type, fields);
                let id = entity.id;
                state.entities.insert((tenant_id, entity_type, id), entity);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(id)
            }
        }
    }

    async fn count(&self, tenant_id: TenantId, entity_type: EntityType) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.entity_type == entity_type)
            .count() as i64)
    }
}

#[async_trait]
impl MappingStore for InMemoryStore {
    async fn find(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        external_id: &ExternalId,
    ) -> StoreResult<Option<IdentityMapping>> {
        let state = self.state.read().await;
        Ok(state
            .mappings
            .get(&(tenant_id, entity_type, external_id.clone()))
            .cloned())
    }

    async fn find_by_internal(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        internal_id: EntityId,
    ) -> StoreResult<Option<IdentityMapping>> {
        let state = self.state.read().await;
        Ok(state
            .mappings
            .values()
            .find(|m| {
                m.tenant_id == tenant_id
                    && m.entity_type == entity_type
                    && m.internal_id == internal_id
            })
            .cloned())
    }

    async fn insert(&self, mapping: IdentityMapping) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let key = (
            mapping.tenant_id,
            mapping.entity_type,
            mapping.external_id.clone(),
        );
        if state.mappings.contains_key(&key) {
            return Err(StoreError::DuplicateMapping {
                entity_type: mapping.entity_type,
                external_id: mapping.external_id,
            });
        }
        state.mappings.insert(key, mapping);
        Ok(())
    }

    async fn touch(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        external_id: &ExternalId,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let mapping = state
            .mappings
            .get_mut(&(tenant_id, entity_type, external_id.clone()))
            .ok_or_else(|| StoreError::not_found("mapping", external_id))?;
        mapping.last_synced_at = Utc::now();
        Ok(())
    }

    async fn list_stale(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<IdentityMapping>> {
        let state = self.state.read().await;
        let mut stale: Vec<IdentityMapping> = state
            .mappings
            .values()
            .filter(|m| {
                m.tenant_id == tenant_id
                    && m.entity_type == entity_type
                    && m.last_synced_at < older_than
            })
            .cloned()
            .collect();
        stale.sort_by_key(|m| m.last_synced_at);
        Ok(stale)
    }
}

#[async_trait]
impl SyncLogStore for InMemoryStore {
    async fn create_run(&self, run: &SyncRun) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.runs.push(run.clone());
        Ok(())
    }

    async fn finalize_run(
        &self,
        tenant_id: TenantId,
        run_id: SyncRunId,
        outcome: RunOutcome,
    ) -> StoreResult<SyncRun> {
        let mut state = self.state.write().await;
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.tenant_id == tenant_id && r.id == run_id)
            .ok_or_else(|| StoreError::not_found("sync run", run_id))?;

        if run.status.is_terminal() {
            return Err(StoreError::RunFinalized { run_id });
        }

        run.status = outcome.status;
        run.records_processed = outcome.records_processed;
        run.records_failed = outcome.records_failed;
        run.error_message = outcome.error_message;
        run.finished_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn read_recent(
        &self,
        tenant_id: TenantId,
        module: &str,
        limit: u32,
    ) -> StoreResult<Vec<SyncRun>> {
        let state = self.state.read().await;
        let mut runs: Vec<SyncRun> = state
            .runs
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.module == module)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }
}
