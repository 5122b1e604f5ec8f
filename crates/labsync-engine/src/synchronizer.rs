//! Entity synchronizer
//!
//! Drives the uniform per-record algorithm for one entity profile:
//! resolve identity, diff the ERP-owned fields, upsert idempotently, bind
//! new mappings (secondary-key match first), touch every processed
//! mapping. One bad record never aborts the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use labsync_core::TenantId;
use labsync_erp::{ErpGateway, ExternalRecord};
use labsync_store::{EntityStore, RunOutcome, RunStatus, StoreError};

use crate::error::{SyncError, SyncResult};
use crate::identity::IdentityMapper;
use crate::profile::EntityProfile;

/// Cooperative cancellation flag, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the run stops before the next record.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag at the start of a new run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What a single record did to the internal store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new internal entity was created and bound.
    Created,
    /// An existing entity's ERP-owned fields were updated.
    Updated,
    /// Remote data matched the stored projection; no write.
    Unchanged,
}

/// Counters accumulated over one synchronizer pass.
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    /// Records successfully processed.
    pub processed: i64,
    /// Records skipped after a per-record failure.
    pub failed: i64,
    /// Entities created.
    pub created: i64,
    /// Entities updated.
    pub updated: i64,
    /// Records that required no write.
    pub unchanged: i64,
    /// Most recent per-record error.
    pub last_error: Option<String>,
    /// Set when the batch was cut short (cancellation, pull failure);
    /// already-committed records stay committed.
    pub abort_reason: Option<String>,
}

impl RunTotals {
    fn record(&mut self, outcome: RecordOutcome) {
        self.processed += 1;
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Unchanged => self.unchanged += 1,
        }
    }

    fn record_failure(&mut self, error: &SyncError) {
        self.failed += 1;
        self.last_error = Some(error.to_string());
    }

    /// Terminal status for these totals.
    ///
    /// `success` only with zero failures; `partial` when successes and
    /// failures mix; an aborted or all-failed batch is `failed`.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.abort_reason.is_some() {
            RunStatus::Failed
        } else if self.failed == 0 {
            RunStatus::Success
        } else if self.processed > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }

    /// Terminal outcome applied to the run log.
    #[must_use]
    pub fn into_outcome(self) -> RunOutcome {
        let status = self.status();
        RunOutcome {
            status,
            records_processed: self.processed,
            records_failed: self.failed,
            error_message: self.abort_reason.or(self.last_error),
        }
    }
}

/// Synchronizer for one entity type.
pub struct EntitySynchronizer {
    tenant_id: TenantId,
    profile: Arc<dyn EntityProfile>,
    gateway: Arc<ErpGateway>,
    entities: Arc<dyn EntityStore>,
    mapper: IdentityMapper,
}

impl EntitySynchronizer {
    /// Wire a synchronizer from its collaborators.
    pub fn new(
        tenant_id: TenantId,
        profile: Arc<dyn EntityProfile>,
        gateway: Arc<ErpGateway>,
        entities: Arc<dyn EntityStore>,
        mapper: IdentityMapper,
    ) -> Self {
        Self {
            tenant_id,
            profile,
            gateway,
            entities,
            mapper,
        }
    }

    /// Module name this synchronizer runs under.
    #[must_use]
    pub fn module(&self) -> &'static str {
        self.profile.module()
    }

    /// Execute one full pass.
    ///
    /// Returns `Err` only for errors that invalidate the whole batch
    /// before any record was processed (authentication, malformed
    /// filter); everything else is accounted in the returned totals.
    #[instrument(skip(self, cancel), fields(tenant_id = %self.tenant_id, module = self.module()))]
    pub async fn run(&self, cancel: &CancelFlag) -> SyncResult<RunTotals> {
        let mut totals = RunTotals::default();

        debug!(model = self.profile.remote_model(), "fetching remote records");
        let mut feed = self.gateway.clone().search_feed(
            self.profile.remote_model(),
            self.profile.base_filter(),
            self.profile.remote_fields(),
            None,
        );

        let mut pulled_any = false;
        'pull: loop {
            let records = match feed.next_page().await {
                Ok(Some(records)) => records,
                Ok(None) => break,
                Err(e) if !pulled_any => return Err(e.into()),
                Err(e) => {
                    // records already committed stay committed; the rest of
                    // the batch is unreachable this pass
                    warn!(error = %e, "pull interrupted mid-pagination");
                    totals.abort_reason = Some(format!("pull interrupted: {e}"));
                    break;
                }
            };
            pulled_any = true;

            for record in records {
                if cancel.is_cancelled() {
                    info!(
                        processed = totals.processed,
                        "cancellation requested, stopping between records"
                    );
                    totals.abort_reason = Some(SyncError::Cancelled.to_string());
                    break 'pull;
                }

                match self.process_record(&record).await {
                    Ok(outcome) => {
                        totals.record(outcome);
                        if let Err(e) = self.mapper.touch(self.profile.entity_type(), &record.id).await
                        {
                            warn!(external_id = %record.id, error = %e, "failed to touch mapping");
                        }
                    }
                    Err(e) => {
                        warn!(
                            external_id = %record.id,
                            model = self.profile.remote_model(),
                            error = %e,
                            "record skipped"
                        );
                        totals.record_failure(&e);
                    }
                }
            }
        }

        info!(
            processed = totals.processed,
            failed = totals.failed,
            created = totals.created,
            updated = totals.updated,
            unchanged = totals.unchanged,
            "sync pass finished"
        );
        Ok(totals)
    }

    /// Apply one remote record to the internal store.
    async fn process_record(&self, record: &ExternalRecord) -> SyncResult<RecordOutcome> {
        let entity_type = self.profile.entity_type();
        let incoming = self.profile.extract(record)?;

        if let Some(internal_id) = self.mapper.resolve(entity_type, &record.id).await? {
            let entity = self
                .entities
                .get(self.tenant_id, entity_type, internal_id)
                .await?
                .ok_or_else(|| StoreError::not_found("entity", internal_id))?;

            if entity.external.diff(&incoming).is_empty() {
                return Ok(RecordOutcome::Unchanged);
            }
            self.entities
                .upsert(self.tenant_id, entity_type, Some(internal_id), incoming)
                .await?;
            return Ok(RecordOutcome::Updated);
        }

        // No mapping yet: try the business key before creating a duplicate.
        let key = self.profile.secondary_key();
        let matched = match incoming.key_value(key) {
            Some(value) => {
                self.entities
                    .find_by_key(self.tenant_id, entity_type, key, value)
                    .await?
            }
            None => None,
        };

        match matched {
            Some(entity) => {
                self.mapper.bind(entity_type, &record.id, entity.id).await?;
                if entity.external.diff(&incoming).is_empty() {
                    Ok(RecordOutcome::Unchanged)
                } else {
                    self.entities
                        .upsert(self.tenant_id, entity_type, Some(entity.id), incoming)
                        .await?;
                    Ok(RecordOutcome::Updated)
                }
            }
            None => {
                let id = self
                    .entities
                    .upsert(self.tenant_id, entity_type, None, incoming)
                    .await?;
                self.mapper.bind(entity_type, &record.id, id).await?;
                Ok(RecordOutcome::Created)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success_with_zero_failures() {
        let mut totals = RunTotals::default();
        totals.record(RecordOutcome::Created);
        totals.record(RecordOutcome::Unchanged);
        assert_eq!(totals.status(), RunStatus::Success);
    }

    #[test]
    fn test_status_partial_when_mixed() {
        let mut totals = RunTotals::default();
        totals.record(RecordOutcome::Updated);
        totals.record_failure(&SyncError::Cancelled);
        assert_eq!(totals.status(), RunStatus::Partial);
    }

    #[test]
    fn test_status_failed_when_everything_failed() {
        let mut totals = RunTotals::default();
        totals.record_failure(&SyncError::Cancelled);
        assert_eq!(totals.status(), RunStatus::Failed);
    }

    #[test]
    fn test_status_failed_when_aborted() {
        let mut totals = RunTotals::default();
        totals.record(RecordOutcome::Updated);
        totals.abort_reason = Some("run cancelled before completion".to_string());
        assert_eq!(totals.status(), RunStatus::Failed);
    }

    #[test]
    fn test_outcome_prefers_abort_reason() {
        let mut totals = RunTotals::default();
        totals.record_failure(&SyncError::Cancelled);
        totals.abort_reason = Some("pull interrupted: timeout".to_string());
        let outcome = totals.into_outcome();
        assert_eq!(outcome.error_message.as_deref(), Some("pull interrupted: timeout"));
    }

    #[test]
    fn test_empty_run_is_success() {
        assert_eq!(RunTotals::default().status(), RunStatus::Success);
    }

    #[test]
    fn test_cancel_flag_reset() {
        let flag = CancelFlag::new();
        flag.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!flag.is_cancelled());
    }
}
