//! Reverse-direction link repair
//!
//! The one flow that writes to the ERP: an internal clinic with no
//! identity mapping gets a partner record created remotely, and the
//! returned id is bound. Covers clinics entered locally before the ERP
//! knew about them, and mappings lost to historical drift.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use labsync_core::{EntityId, EntityType, ExternalId, TenantId};
use labsync_erp::{ErpGateway, FieldValues};
use labsync_store::{EntityStore, MappingStore, StoreError};

use crate::error::SyncResult;
use crate::identity::IdentityMapper;

/// Repairs missing clinic→partner links.
pub struct LinkRepairer {
    tenant_id: TenantId,
    gateway: Arc<ErpGateway>,
    entities: Arc<dyn EntityStore>,
    mappings: Arc<dyn MappingStore>,
    mapper: IdentityMapper,
}

impl LinkRepairer {
    /// Wire a repairer from its collaborators.
    pub fn new(
        tenant_id: TenantId,
        gateway: Arc<ErpGateway>,
        entities: Arc<dyn EntityStore>,
        mappings: Arc<dyn MappingStore>,
    ) -> Self {
        let mapper = IdentityMapper::new(tenant_id, mappings.clone());
        Self {
            tenant_id,
            gateway,
            entities,
            mappings,
            mapper,
        }
    }

    /// Ensure a clinic has a partner record in the ERP.
    ///
    /// Idempotent: an already-linked clinic returns its existing external
    /// id without touching the ERP.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub async fn ensure_remote_partner(&self, clinic_id: EntityId) -> SyncResult<ExternalId> {
        if let Some(mapping) = self
            .mappings
            .find_by_internal(self.tenant_id, EntityType::Clinic, clinic_id)
            .await?
        {
            return Ok(mapping.external_id);
        }

        let clinic = self
            .entities
            .get(self.tenant_id, EntityType::Clinic, clinic_id)
            .await?
            .ok_or_else(|| StoreError::not_found("entity", clinic_id))?;

        let mut fields = FieldValues::new()
            .with("name", json!(clinic.external.name))
            .with("is_company", json!(true))
            .with("active", json!(clinic.external.active));
        if let Some(email) = &clinic.external.email {
            fields.set("email", json!(email));
        }
        if let Some(phone) = &clinic.external.phone {
            fields.set("phone", json!(phone));
        }
        if let Some(reference) = &clinic.external.reference {
            fields.set("ref", json!(reference));
        }

        let external_id = self
            .gateway
            .upsert_remote("res.partner", None, &fields)
            .await?;
        self.mapper
            .bind(EntityType::Clinic, &external_id, clinic_id)
            .await?;

        info!(
            clinic_id = %clinic_id,
            external_id = %external_id,
            "created missing partner record and bound mapping"
        );
        Ok(external_id)
    }
}
