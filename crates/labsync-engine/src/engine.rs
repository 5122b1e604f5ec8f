//! Engine assembly
//!
//! Wires the gateway, stores, and the three entity synchronizers into a
//! ready-to-run engine. The ERP capability probe runs here, once, at
//! startup: a missing execution RPC is a fatal configuration error, never
//! a runtime fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use labsync_core::TenantId;
use labsync_erp::ErpGateway;
use labsync_store::{
    EntityStore, InMemoryStore, LocalRunLock, MappingStore, RunLock, SyncLogStore,
};

use crate::error::SyncResult;
use crate::identity::IdentityMapper;
use crate::orchestrator::{SyncOrchestrator, TriggerOutcome};
use crate::profile::{EntityProfile, PartnerProfile, ProductProfile, StaffProfile};
use crate::repair::LinkRepairer;
use crate::report::SyncReporter;
use crate::scheduler::SyncScheduler;
use crate::synchronizer::EntitySynchronizer;

/// The store backends an engine runs against.
#[derive(Clone)]
pub struct EngineStores {
    /// Internal entities.
    pub entities: Arc<dyn EntityStore>,
    /// Identity mappings.
    pub mappings: Arc<dyn MappingStore>,
    /// Run history.
    pub log: Arc<dyn SyncLogStore>,
    /// Single-flight lock.
    pub lock: Arc<dyn RunLock>,
}

impl EngineStores {
    /// All-in-memory stores with a process-local lock, for tests and
    /// embedded use.
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            entities: store.clone(),
            mappings: store.clone(),
            log: store,
            lock: Arc::new(LocalRunLock::new()),
        }
    }
}

/// A fully wired sync engine for one tenant.
pub struct SyncEngine {
    orchestrator: Arc<SyncOrchestrator>,
    reporter: SyncReporter,
    repairer: LinkRepairer,
}

impl SyncEngine {
    /// Probe the ERP and assemble the engine.
    ///
    /// Registers the partner, product, and staff synchronizers. Fails with
    /// [`labsync_erp::ErpError::CapabilityMissing`] (or an authentication
    /// error) when the ERP endpoint cannot support syncing — the engine
    /// refuses to start rather than degrade at runtime.
    #[instrument(skip_all, fields(tenant_id = %tenant_id))]
    pub async fn connect(
        tenant_id: TenantId,
        gateway: Arc<ErpGateway>,
        stores: EngineStores,
    ) -> SyncResult<Self> {
        gateway.probe_capabilities().await?;

        let mapper = IdentityMapper::new(tenant_id, stores.mappings.clone());
        let profiles: [Arc<dyn EntityProfile>; 3] = [
            Arc::new(PartnerProfile),
            Arc::new(ProductProfile),
            Arc::new(StaffProfile),
        ];

        let mut orchestrator =
            SyncOrchestrator::new(tenant_id, stores.log.clone(), stores.lock.clone());
        for profile in profiles {
            orchestrator.register(EntitySynchronizer::new(
                tenant_id,
                profile,
                gateway.clone(),
                stores.entities.clone(),
                mapper.clone(),
            ));
        }
        let orchestrator = Arc::new(orchestrator);

        info!(modules = ?orchestrator.modules(), "sync engine ready");

        let reporter = SyncReporter::new(
            tenant_id,
            stores.log.clone(),
            stores.entities.clone(),
            stores.mappings.clone(),
        );
        let repairer = LinkRepairer::new(
            tenant_id,
            gateway,
            stores.entities.clone(),
            stores.mappings.clone(),
        );

        Ok(Self {
            orchestrator,
            reporter,
            repairer,
        })
    }

    /// The orchestrator, for triggering and cancelling runs.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// The reporting surface.
    #[must_use]
    pub fn reporter(&self) -> &SyncReporter {
        &self.reporter
    }

    /// The clinic→partner link repairer.
    #[must_use]
    pub fn repairer(&self) -> &LinkRepairer {
        &self.repairer
    }

    /// Trigger one module on demand.
    pub async fn trigger_sync(&self, module: &str) -> SyncResult<TriggerOutcome> {
        self.orchestrator.trigger_sync(module).await
    }

    /// A scheduler triggering every registered module at `every`.
    #[must_use]
    pub fn scheduler(&self, every: Duration) -> SyncScheduler {
        SyncScheduler::new(self.orchestrator.clone()).with_all_modules(every)
    }
}
