//! Store traits
//!
//! The seams between the sync engine and whatever holds its state. The
//! engine only ever sees these traits; production wires in the PostgreSQL
//! implementations, tests wire in [`crate::memory::InMemoryStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use labsync_core::{EntityId, EntityType, ExternalId, SyncRunId, TenantId};

use crate::entity::{ExternalFields, InternalEntity, SecondaryKey};
use crate::error::StoreResult;
use crate::mapping::IdentityMapping;
use crate::run::{RunOutcome, SyncRun};

/// Access to internal entities.
///
/// Implementations serialize concurrent writes to the same entity; two
/// synchronizers for different modules never touch the same rows, but the
/// store must not rely on that.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch an entity by id.
    async fn get(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        id: EntityId,
    ) -> StoreResult<Option<InternalEntity>>;

    /// Find an entity by a business-unique key value.
    async fn find_by_key(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        key: SecondaryKey,
        value: &str,
    ) -> StoreResult<Option<InternalEntity>>;

    /// Create or update the ERP-owned fields of an entity.
    ///
    /// With `id = None` a new entity is created; otherwise only the
    /// external projection of the existing row is replaced — locally-owned
    /// fields are preserved. Each upsert is its own atomic unit.
    async fn upsert(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        id: Option<EntityId>,
        fields: ExternalFields,
    ) -> StoreResult<EntityId>;

    /// Number of entities of a type, for reporting.
    async fn count(&self, tenant_id: TenantId, entity_type: EntityType) -> StoreResult<i64>;
}

/// Access to identity mappings.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Look up a mapping; never mutates.
    async fn find(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        external_id: &ExternalId,
    ) -> StoreResult<Option<IdentityMapping>>;

    /// Reverse lookup: the mapping pointing at an internal entity, if any.
    ///
    /// Used by reverse-direction repair flows to tell unlinked entities
    /// from linked ones.
    async fn find_by_internal(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        internal_id: EntityId,
    ) -> StoreResult<Option<IdentityMapping>>;

    /// Insert a new mapping.
    ///
    /// Fails with [`crate::StoreError::DuplicateMapping`] if the key is
    /// already bound; the existing row is left untouched.
    async fn insert(&self, mapping: IdentityMapping) -> StoreResult<()>;

    /// Bump `last_synced_at` to the current time.
    async fn touch(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        external_id: &ExternalId,
    ) -> StoreResult<()>;

    /// Mappings not seen by any pull since `older_than`.
    async fn list_stale(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<IdentityMapping>>;
}

/// Append-only run history.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    /// Persist a run in the `running` state.
    async fn create_run(&self, run: &SyncRun) -> StoreResult<()>;

    /// Apply the terminal outcome to a running run, exactly once.
    ///
    /// Fails with [`crate::StoreError::RunFinalized`] if the run already
    /// reached a terminal state.
    async fn finalize_run(
        &self,
        tenant_id: TenantId,
        run_id: SyncRunId,
        outcome: RunOutcome,
    ) -> StoreResult<SyncRun>;

    /// Most recent runs for a module, newest first.
    async fn read_recent(
        &self,
        tenant_id: TenantId,
        module: &str,
        limit: u32,
    ) -> StoreResult<Vec<SyncRun>>;
}

/// A held single-flight lease; released explicitly by the orchestrator.
#[async_trait]
pub trait RunLease: Send {
    /// Release the lease.
    async fn release(self: Box<Self>);
}

/// Single-flight lock keyed by `(tenant, module)`.
///
/// The process-local implementation covers a single instance; clustered
/// deployments must use a shared implementation such as
/// `PgRunLock` so overlapping schedulers on different
/// instances cannot run the same module twice.
#[async_trait]
pub trait RunLock: Send + Sync {
    /// Try to acquire the lease; `None` means a run is already in flight.
    async fn try_acquire(
        &self,
        tenant_id: TenantId,
        module: &str,
    ) -> StoreResult<Option<Box<dyn RunLease>>>;
}
