//! Sync run log repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use labsync_core::{SyncRunId, TenantId};

use crate::error::{StoreError, StoreResult};
use crate::run::{RunOutcome, RunStatus, SyncRun};
use crate::traits::SyncLogStore;

const RUN_COLUMNS: &str = "id, tenant_id, module, status, started_at, finished_at, \
                           records_processed, records_failed, error_message";

/// PostgreSQL-backed sync log.
#[derive(Debug, Clone)]
pub struct PgSyncLog {
    pool: PgPool,
}

impl PgSyncLog {
    /// Create a log over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncLogStore for PgSyncLog {
    #[instrument(skip(self, run), fields(run_id = %run.id, module = %run.module))]
    async fn create_run(&self, run: &SyncRun) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO sync_runs \
             (id, tenant_id, module, status, started_at, records_processed, records_failed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(run.id.as_uuid())
        .bind(run.tenant_id.as_uuid())
        .bind(&run.module)
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(run.records_processed)
        .bind(run.records_failed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, outcome), fields(status = %outcome.status))]
    async fn finalize_run(
        &self,
        tenant_id: TenantId,
        run_id: SyncRunId,
        outcome: RunOutcome,
    ) -> StoreResult<SyncRun> {
        // Guarding on status = 'running' makes finalization exactly-once:
        // a terminal row never matches and is left untouched.
        let row = sqlx::query_as::<_, RunRow>(&format!(
            "UPDATE sync_runs \
             SET status = $3, finished_at = NOW(), records_processed = $4, \
                 records_failed = $5, error_message = $6 \
             WHERE tenant_id = $1 AND id = $2 AND status = 'running' \
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(tenant_id.as_uuid())
        .bind(run_id.as_uuid())
        .bind(outcome.status.as_str())
        .bind(outcome.records_processed)
        .bind(outcome.records_failed)
        .bind(&outcome.error_message)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_run(),
            None => {
                let exists: Option<String> = sqlx::query_scalar(
                    "SELECT status FROM sync_runs WHERE tenant_id = $1 AND id = $2",
                )
                .bind(tenant_id.as_uuid())
                .bind(run_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

                match exists {
                    Some(_) => Err(StoreError::RunFinalized { run_id }),
                    None => Err(StoreError::not_found("sync run", run_id)),
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn read_recent(
        &self,
        tenant_id: TenantId,
        module: &str,
        limit: u32,
    ) -> StoreResult<Vec<SyncRun>> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM sync_runs \
             WHERE tenant_id = $1 AND module = $2 \
             ORDER BY started_at DESC \
             LIMIT $3"
        ))
        .bind(tenant_id.as_uuid())
        .bind(module)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RunRow::into_run).collect()
    }
}

/// Database row for a sync run.
#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    tenant_id: Uuid,
    module: String,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    records_processed: i64,
    records_failed: i64,
    error_message: Option<String>,
}

impl RunRow {
    fn into_run(self) -> StoreResult<SyncRun> {
        let status: RunStatus = self
            .status
            .parse()
            .map_err(|e: String| StoreError::Database(sqlx::Error::Decode(e.into())))?;

        Ok(SyncRun {
            id: SyncRunId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            module: self.module,
            status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            records_processed: self.records_processed,
            records_failed: self.records_failed,
            error_message: self.error_message,
        })
    }
}
