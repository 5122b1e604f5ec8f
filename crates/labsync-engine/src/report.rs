//! Run reports
//!
//! The reporting surface consumed by status displays and log viewers.
//! Exposes run history, entity counts, and staleness data; backoff policy
//! (e.g. pausing auto-sync after repeated failures) belongs to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use labsync_core::{EntityType, TenantId};
use labsync_store::{
    EntityStore, IdentityMapping, MappingStore, RunStatus, SyncLogStore, SyncRun,
};

use crate::error::SyncResult;

/// One run, shaped for observability consumers.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Synchronizer module.
    pub module: String,
    /// Run status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished, if terminal.
    pub finished_at: Option<DateTime<Utc>>,
    /// Records successfully processed.
    pub records_processed: i64,
    /// Records that failed.
    pub records_failed: i64,
    /// Most recent error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<SyncRun> for RunReport {
    fn from(run: SyncRun) -> Self {
        Self {
            module: run.module,
            status: run.status,
            started_at: run.started_at,
            finished_at: run.finished_at,
            records_processed: run.records_processed,
            records_failed: run.records_failed,
            error_message: run.error_message,
        }
    }
}

/// Entity counts per type, for dashboards.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EntityCounts {
    pub clinics: i64,
    pub services: i64,
    pub staff: i64,
}

/// Read-side reporting over the store.
#[derive(Clone)]
pub struct SyncReporter {
    tenant_id: TenantId,
    log: Arc<dyn SyncLogStore>,
    entities: Arc<dyn EntityStore>,
    mappings: Arc<dyn MappingStore>,
}

impl SyncReporter {
    /// Create a reporter over the given stores.
    pub fn new(
        tenant_id: TenantId,
        log: Arc<dyn SyncLogStore>,
        entities: Arc<dyn EntityStore>,
        mappings: Arc<dyn MappingStore>,
    ) -> Self {
        Self {
            tenant_id,
            log,
            entities,
            mappings,
        }
    }

    /// Most recent runs for a module, newest first.
    pub async fn recent_runs(&self, module: &str, limit: u32) -> SyncResult<Vec<RunReport>> {
        let runs = self.log.read_recent(self.tenant_id, module, limit).await?;
        Ok(runs.into_iter().map(RunReport::from).collect())
    }

    /// The latest run for a module, if any.
    pub async fn latest_run(&self, module: &str) -> SyncResult<Option<RunReport>> {
        Ok(self.recent_runs(module, 1).await?.into_iter().next())
    }

    /// Length of the current run of consecutive failed runs.
    ///
    /// Data for caller-side backoff decisions (e.g. pause auto-sync after
    /// three straight failures); the engine itself applies no policy.
    pub async fn failure_streak(&self, module: &str, window: u32) -> SyncResult<u32> {
        let runs = self.log.read_recent(self.tenant_id, module, window).await?;
        let mut streak = 0;
        for run in runs {
            match run.status {
                RunStatus::Failed => streak += 1,
                RunStatus::Running => continue,
                _ => break,
            }
        }
        Ok(streak)
    }

    /// Entity counts per type.
    pub async fn entity_counts(&self) -> SyncResult<EntityCounts> {
        Ok(EntityCounts {
            clinics: self.entities.count(self.tenant_id, EntityType::Clinic).await?,
            services: self.entities.count(self.tenant_id, EntityType::Service).await?,
            staff: self.entities.count(self.tenant_id, EntityType::Staff).await?,
        })
    }

    /// Mappings no pull has refreshed since `older_than`.
    pub async fn stale_mappings(
        &self,
        entity_type: EntityType,
        older_than: DateTime<Utc>,
    ) -> SyncResult<Vec<IdentityMapping>> {
        Ok(self
            .mappings
            .list_stale(self.tenant_id, entity_type, older_than)
            .await?)
    }
}
