//! Sync Orchestrator
//!
//! Sequences synchronizers, enforces at-most-one concurrent run per
//! `(tenant, module)`, and owns the run log lifecycle: every triggered run
//! is persisted as `running` and finalized exactly once — even when the
//! synchronizer errors or panics, the log is never left stuck in
//! `running`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use labsync_core::{SyncRunId, TenantId};
use labsync_store::{RunLock, RunOutcome, SyncLogStore, SyncRun};

use crate::error::{SyncError, SyncResult};
use crate::synchronizer::{CancelFlag, EntitySynchronizer};

/// Whether a trigger started a run or was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    /// A run was started and driven to a terminal state.
    Ok,
    /// A run for this module is already in flight; rejected, not queued.
    Busy,
}

/// Result of a `trigger_sync` call.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutcome {
    /// Whether a run started.
    pub status: TriggerStatus,
    /// The finalized run, when one started.
    pub run: Option<SyncRun>,
}

impl TriggerOutcome {
    fn busy() -> Self {
        Self {
            status: TriggerStatus::Busy,
            run: None,
        }
    }

    fn completed(run: SyncRun) -> Self {
        Self {
            status: TriggerStatus::Ok,
            run: Some(run),
        }
    }

    /// Whether the trigger was rejected because the module was busy.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.status == TriggerStatus::Busy
    }

    /// Id of the run, when one started.
    #[must_use]
    pub fn run_id(&self) -> Option<SyncRunId> {
        self.run.as_ref().map(|r| r.id)
    }
}

/// Orchestrator for one tenant's synchronizers.
pub struct SyncOrchestrator {
    tenant_id: TenantId,
    synchronizers: HashMap<&'static str, Arc<EntitySynchronizer>>,
    cancel_flags: HashMap<&'static str, CancelFlag>,
    log: Arc<dyn SyncLogStore>,
    lock: Arc<dyn RunLock>,
}

impl SyncOrchestrator {
    /// Create an orchestrator with no synchronizers registered.
    pub fn new(tenant_id: TenantId, log: Arc<dyn SyncLogStore>, lock: Arc<dyn RunLock>) -> Self {
        Self {
            tenant_id,
            synchronizers: HashMap::new(),
            cancel_flags: HashMap::new(),
            log,
            lock,
        }
    }

    /// Register a synchronizer under its module name.
    pub fn register(&mut self, synchronizer: EntitySynchronizer) {
        let module = synchronizer.module();
        self.cancel_flags.insert(module, CancelFlag::new());
        self.synchronizers.insert(module, Arc::new(synchronizer));
    }

    /// Registered module names.
    #[must_use]
    pub fn modules(&self) -> Vec<&'static str> {
        let mut modules: Vec<_> = self.synchronizers.keys().copied().collect();
        modules.sort_unstable();
        modules
    }

    /// The tenant this orchestrator serves.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Request cooperative cancellation of an in-flight run.
    ///
    /// Returns `false` for unknown modules. Already-processed records stay
    /// committed; the run finalizes as `failed` with a distinct reason.
    pub fn cancel(&self, module: &str) -> bool {
        match self.cancel_flags.get(module) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Trigger a synchronizer run and drive it to a terminal state.
    ///
    /// At most one run per module is in flight at any time; a second
    /// trigger while one runs gets a `Busy` outcome immediately.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub async fn trigger_sync(&self, module: &str) -> SyncResult<TriggerOutcome> {
        let synchronizer = self
            .synchronizers
            .get(module)
            .ok_or_else(|| SyncError::UnknownModule {
                module: module.to_string(),
            })?;

        let Some(lease) = self.lock.try_acquire(self.tenant_id, module).await? else {
            info!(module, "sync already in flight, rejecting trigger");
            return Ok(TriggerOutcome::busy());
        };

        let run = SyncRun::start(self.tenant_id, module);
        if let Err(e) = self.log.create_run(&run).await {
            lease.release().await;
            return Err(e.into());
        }
        info!(module, run_id = %run.id, "sync run started");

        let flag = self
            .cancel_flags
            .get(module)
            .cloned()
            .unwrap_or_default();
        flag.reset();

        // Run in a separate task so a panicking synchronizer still gets
        // its run finalized instead of leaving it stuck in `running`.
        let task = Arc::clone(synchronizer);
        let task_flag = flag.clone();
        let handle = tokio::spawn(async move { task.run(&task_flag).await });

        let outcome = match handle.await {
            Ok(Ok(totals)) => totals.into_outcome(),
            Ok(Err(e)) => {
                warn!(module, error = %e, "sync run failed");
                RunOutcome::failed(e.to_string())
            }
            Err(join_error) => {
                error!(module, error = %join_error, "synchronizer crashed");
                RunOutcome::failed(format!("synchronizer crashed: {join_error}"))
            }
        };

        let finalized = self.log.finalize_run(self.tenant_id, run.id, outcome).await;
        lease.release().await;

        let finalized = finalized?;
        info!(
            module,
            run_id = %finalized.id,
            status = %finalized.status,
            processed = finalized.records_processed,
            failed = finalized.records_failed,
            "sync run finalized"
        );
        Ok(TriggerOutcome::completed(finalized))
    }
}
