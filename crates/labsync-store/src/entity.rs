//! Internal entity model.
//!
//! Entities carry two classes of fields: the ERP-owned projection
//! ([`ExternalFields`]), which the synchronizer is the sole writer of, and
//! locally-entered fields (`notes`), which sync must never touch.

use chrono::{DateTime, Utc};
use labsync_core::{EntityId, EntityType, TenantId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places monetary fields are stored with.
pub const MONEY_SCALE: u32 = 2;

/// Business-unique field used for secondary matching when no identity
/// mapping exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryKey {
    /// Match on the email field.
    Email,
    /// Match on the display name.
    Name,
    /// Match on the external reference code.
    Reference,
}

impl SecondaryKey {
    /// Column/field name in the internal store.
    #[must_use]
    pub fn field_name(&self) -> &'static str {
        match self {
            SecondaryKey::Email => "email",
            SecondaryKey::Name => "name",
            SecondaryKey::Reference => "reference",
        }
    }
}

/// The ERP-owned projection of an entity.
///
/// Only these fields are compared and written by the synchronizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalFields {
    /// Display name. Required on every synced entity.
    pub name: String,
    /// Contact email, when the ERP record carries one.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Unit price for services; absent for clinics and staff.
    pub price: Option<Decimal>,
    /// Whether the record is active in the ERP.
    pub active: bool,
    /// The ERP's human-readable reference code.
    pub reference: Option<String>,
}

impl ExternalFields {
    /// Minimal set of fields: a name and the active flag.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
            price: None,
            active: true,
            reference: None,
        }
    }

    /// Copy with monetary fields rounded to the storage scale.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.price = self.price.map(|p| {
            let mut p = p.round_dp(MONEY_SCALE);
            p.rescale(MONEY_SCALE);
            p
        });
        self
    }

    /// Names of fields that differ between `self` and `other`.
    ///
    /// An empty result means an upsert would be a no-op; the synchronizer
    /// skips the write entirely in that case.
    #[must_use]
    pub fn diff(&self, other: &ExternalFields) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.name != other.name {
            changed.push("name");
        }
        if self.email != other.email {
            changed.push("email");
        }
        if self.phone != other.phone {
            changed.push("phone");
        }
        if self.price.map(|p| p.round_dp(MONEY_SCALE))
            != other.price.map(|p| p.round_dp(MONEY_SCALE))
        {
            changed.push("price");
        }
        if self.active != other.active {
            changed.push("active");
        }
        if self.reference != other.reference {
            changed.push("reference");
        }
        changed
    }

    /// Value of a secondary-key field, if set.
    #[must_use]
    pub fn key_value(&self, key: SecondaryKey) -> Option<&str> {
        match key {
            SecondaryKey::Email => self.email.as_deref(),
            SecondaryKey::Name => Some(&self.name),
            SecondaryKey::Reference => self.reference.as_deref(),
        }
    }
}

/// An entity row in the internal store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalEntity {
    /// Internal identifier.
    pub id: EntityId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Entity kind.
    pub entity_type: EntityType,
    /// ERP-owned fields.
    pub external: ExternalFields,
    /// Locally-entered notes; never written by sync.
    pub notes: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl InternalEntity {
    /// Create a new entity from ERP-owned fields.
    #[must_use]
    pub fn new(tenant_id: TenantId, entity_type: EntityType, external: ExternalFields) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            tenant_id,
            entity_type,
            external: external.normalized(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}
