//! # Labsync Engine
//!
//! The ERP synchronization engine: keeps a multi-tenant clinical database
//! consistent with an external ERP's customer, product/service, and staff
//! records. Identities are reconciled across the two systems through a
//! durable mapping layer, partial failure is isolated per record, and
//! every pass is idempotent — re-running with unchanged remote data
//! performs zero writes.
//!
//! ## Architecture
//!
//! - [`IdentityMapper`] - durable external↔internal id mapping with
//!   split-brain detection
//! - [`EntitySynchronizer`] - fetch, diff, and idempotent upsert for one
//!   entity profile ([`profile::PartnerProfile`],
//!   [`profile::ProductProfile`], [`profile::StaffProfile`])
//! - [`SyncOrchestrator`] - single-flight execution per `(tenant, module)`
//!   and exactly-once run finalization
//! - [`SyncScheduler`] - recurring triggers with cooperative shutdown
//! - [`SyncReporter`] - run history, entity counts, staleness data
//! - [`LinkRepairer`] - the one reverse-direction flow (clinic→partner)
//!
//! ## Example
//!
//! ```ignore
//! use labsync_engine::{EngineStores, SyncEngine};
//! use labsync_erp::{ErpConfig, ErpGateway, JsonRpcClient, RetryExecutor};
//!
//! let client = JsonRpcClient::new(config)?;
//! let gateway = Arc::new(ErpGateway::new(
//!     Arc::new(client),
//!     RetryExecutor::default(),
//!     100,
//! ));
//!
//! // Fails fast if the ERP endpoint lacks the execution RPC.
//! let engine = SyncEngine::connect(tenant_id, gateway, stores).await?;
//!
//! let outcome = engine.trigger_sync("products").await?;
//! println!("run {:?}: {:?}", outcome.run_id(), outcome.status);
//! ```

pub mod engine;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod profile;
pub mod repair;
pub mod report;
pub mod scheduler;
pub mod synchronizer;

pub use engine::{EngineStores, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use identity::IdentityMapper;
pub use orchestrator::{SyncOrchestrator, TriggerOutcome, TriggerStatus};
pub use profile::{EntityProfile, PartnerProfile, ProductProfile, StaffProfile};
pub use repair::LinkRepairer;
pub use report::{EntityCounts, RunReport, SyncReporter};
pub use scheduler::{ScheduleEntry, SyncScheduler};
pub use synchronizer::{CancelFlag, EntitySynchronizer, RecordOutcome, RunTotals};
