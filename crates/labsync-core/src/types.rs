//! Entity types and external identifiers.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The kinds of entities the engine reconciles between the ERP and the
/// internal store.
///
/// Each variant corresponds to one synchronizer module: clinics mirror ERP
/// partners, services mirror ERP products, staff members mirror ERP
/// employee contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A customer clinic (ERP partner record).
    Clinic,
    /// A billable service (ERP product record).
    Service,
    /// A staff member (ERP employee/contact record).
    Staff,
}

impl EntityType {
    /// Stable string form, used for database columns and log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Clinic => "clinic",
            EntityType::Service => "service",
            EntityType::Staff => "staff",
        }
    }

    /// All entity types, in the order synchronizers run.
    #[must_use]
    pub fn all() -> [EntityType; 3] {
        [EntityType::Clinic, EntityType::Service, EntityType::Staff]
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clinic" => Ok(EntityType::Clinic),
            "service" => Ok(EntityType::Service),
            "staff" => Ok(EntityType::Staff),
            other => Err(format!("Unknown entity type: {other}")),
        }
    }
}

/// Opaque identifier of a record in the external ERP.
///
/// The ERP assigns numeric ids; they are kept as strings here so the
/// mapping layer does not depend on the remote system's id scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    /// Create an external id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Create an external id from the ERP's numeric id.
    #[must_use]
    pub fn from_numeric(id: i64) -> Self {
        Self(id.to_string())
    }

    /// The raw id value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric form, if this id is numeric.
    #[must_use]
    pub fn as_numeric(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl Display for ExternalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ExternalId {
    fn from(id: i64) -> Self {
        Self::from_numeric(id)
    }
}

impl From<&str> for ExternalId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
