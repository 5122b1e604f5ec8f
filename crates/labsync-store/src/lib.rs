//! # Internal Store
//!
//! The canonical store the sync engine writes to: internal entities with
//! their ERP-owned field projection, durable identity mappings, and the
//! append-only sync run log. The engine consumes the traits in [`traits`];
//! this crate ships two backends — [`memory::InMemoryStore`] for tests and
//! embedded use, and the PostgreSQL repositories in [`postgres`] for
//! production.
//!
//! There is deliberately a single canonical schema here: mirror tables and
//! cross-schema duplication are what the sync engine exists to replace.
//!
//! ## Crate Organization
//!
//! - [`entity`] - Internal entities and the ERP-owned field projection
//! - [`mapping`] - Identity mappings between external and internal ids
//! - [`run`] - Sync run records and terminal outcomes
//! - [`traits`] - `EntityStore`, `MappingStore`, `SyncLogStore`, `RunLock`
//! - [`lock`] - Process-local single-flight lock
//! - [`memory`] - In-memory backend
//! - [`postgres`] - PostgreSQL backend and the advisory-lock `RunLock`
//! - [`migrations`] - Embedded SQL migrations

pub mod entity;
pub mod error;
pub mod lock;
pub mod mapping;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod run;
pub mod traits;

pub use entity::{ExternalFields, InternalEntity, SecondaryKey, MONEY_SCALE};
pub use error::{StoreError, StoreResult};
pub use lock::LocalRunLock;
pub use mapping::IdentityMapping;
pub use memory::InMemoryStore;
pub use run::{RunOutcome, RunStatus, SyncRun};
pub use traits::{EntityStore, MappingStore, RunLease, RunLock, SyncLogStore};
