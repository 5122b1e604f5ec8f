//! # Labsync Core
//!
//! Shared foundation types for the labsync ERP synchronization engine:
//! strongly typed identifiers, the set of synchronized entity types, and
//! the opaque external-identifier type used to key identity mappings.
//!
//! This crate is deliberately small. Everything protocol- or store-specific
//! lives in `labsync-erp` and `labsync-store`; the engine itself lives in
//! `labsync-engine`.

pub mod ids;
pub mod types;

pub use ids::{EntityId, ParseIdError, SyncRunId, TenantId};
pub use types::{EntityType, ExternalId};
