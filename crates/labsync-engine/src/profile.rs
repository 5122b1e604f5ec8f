//! Entity profiles
//!
//! One profile per synchronized entity type. A profile tells the generic
//! synchronizer where to pull from (remote model, filter, field list), how
//! to match unmapped records (secondary key), and how to project a remote
//! record onto the internal ERP-owned fields — including required-field
//! validation and money normalization.

use labsync_core::EntityType;
use labsync_erp::{ExternalRecord, Filter};
use labsync_store::{ExternalFields, SecondaryKey};

use crate::error::{SyncError, SyncResult};

/// Per-entity-type sync behavior consumed by the generic synchronizer.
pub trait EntityProfile: Send + Sync {
    /// Module name used for triggering, locking, and the run log.
    fn module(&self) -> &'static str;

    /// The internal entity type this profile writes.
    fn entity_type(&self) -> EntityType;

    /// Remote model to search.
    fn remote_model(&self) -> &'static str;

    /// Fields requested from the ERP.
    fn remote_fields(&self) -> &'static [&'static str];

    /// Scope of records this synchronizer owns.
    fn base_filter(&self) -> Filter;

    /// Business-unique key tried before creating a new entity.
    fn secondary_key(&self) -> SecondaryKey;

    /// Project a remote record onto the ERP-owned fields.
    ///
    /// Records with a null or empty required field are rejected with a
    /// [`SyncError::Validation`] carrying the offending field, never
    /// defaulted silently.
    fn extract(&self, record: &ExternalRecord) -> SyncResult<ExternalFields>;
}

/// Records hidden by the ERP's active flag must still be pulled, otherwise
/// a deactivation in the ERP would never reach the internal store.
fn include_archived() -> Filter {
    Filter::any_of("active", vec![true.into(), false.into()])
}

fn required_name(profile: &dyn EntityProfile, record: &ExternalRecord) -> SyncResult<String> {
    record
        .fields
        .get_str("name")
        .map(String::from)
        .ok_or_else(|| {
            SyncError::validation(
                profile.remote_model(),
                record.id.clone(),
                "name",
                "required field is null or empty",
            )
        })
}

/// Clinics, mirrored from ERP partner records.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartnerProfile;

impl EntityProfile for PartnerProfile {
    fn module(&self) -> &'static str {
        "partners"
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Clinic
    }

    fn remote_model(&self) -> &'static str {
        "res.partner"
    }

    fn remote_fields(&self) -> &'static [&'static str] {
        &["name", "email", "phone", "active", "ref"]
    }

    fn base_filter(&self) -> Filter {
        Filter::eq("is_company", true).and_with(include_archived())
    }

    fn secondary_key(&self) -> SecondaryKey {
        SecondaryKey::Email
    }

    fn extract(&self, record: &ExternalRecord) -> SyncResult<ExternalFields> {
        Ok(ExternalFields {
            name: required_name(self, record)?,
            email: record.fields.get_str("email").map(String::from),
            phone: record.fields.get_str("phone").map(String::from),
            price: None,
            active: record.fields.get_bool("active").unwrap_or(true),
            reference: record.fields.get_str("ref").map(String::from),
        })
    }
}

/// Billable services, mirrored from ERP product records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductProfile;

impl EntityProfile for ProductProfile {
    fn module(&self) -> &'static str {
        "products"
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Service
    }

    fn remote_model(&self) -> &'static str {
        "product.product"
    }

    fn remote_fields(&self) -> &'static [&'static str] {
        &["name", "list_price", "active", "default_code"]
    }

    fn base_filter(&self) -> Filter {
        Filter::eq("sale_ok", true).and_with(include_archived())
    }

    fn secondary_key(&self) -> SecondaryKey {
        SecondaryKey::Name
    }

    fn extract(&self, record: &ExternalRecord) -> SyncResult<ExternalFields> {
        Ok(ExternalFields {
            name: required_name(self, record)?,
            email: None,
            phone: None,
            // normalized to fixed-point at the wire; compared at store scale
            price: record.fields.get_decimal("list_price"),
            active: record.fields.get_bool("active").unwrap_or(true),
            reference: record.fields.get_str("default_code").map(String::from),
        })
    }
}

/// Staff members, mirrored from ERP employee records.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaffProfile;

impl EntityProfile for StaffProfile {
    fn module(&self) -> &'static str {
        "staff"
    }

    fn entity_type(&self) -> EntityType {
        EntityType::Staff
    }

    fn remote_model(&self) -> &'static str {
        "hr.employee"
    }

    fn remote_fields(&self) -> &'static [&'static str] {
        &["name", "work_email", "work_phone", "active"]
    }

    fn base_filter(&self) -> Filter {
        include_archived()
    }

    fn secondary_key(&self) -> SecondaryKey {
        SecondaryKey::Email
    }

    fn extract(&self, record: &ExternalRecord) -> SyncResult<ExternalFields> {
        Ok(ExternalFields {
            name: required_name(self, record)?,
            email: record.fields.get_str("work_email").map(String::from),
            phone: record.fields.get_str("work_phone").map(String::from),
            price: None,
            active: record.fields.get_bool("active").unwrap_or(true),
            reference: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_core::ExternalId;
    use labsync_erp::FieldValues;
    use serde_json::json;

    fn record(id: i64, fields: FieldValues) -> ExternalRecord {
        ExternalRecord::new(ExternalId::from_numeric(id), fields)
    }

    #[test]
    fn test_partner_extract_maps_contact_fields() {
        let fields = FieldValues::new()
            .with("name", json!("Clinica Norte"))
            .with("email", json!("norte@clinic.example"))
            .with("phone", json!("+34 600 000 000"))
            .with("active", json!(true))
            .with("ref", json!("CLN-001"));

        let extracted = PartnerProfile.extract(&record(5, fields)).unwrap();
        assert_eq!(extracted.name, "Clinica Norte");
        assert_eq!(extracted.email.as_deref(), Some("norte@clinic.example"));
        assert_eq!(extracted.reference.as_deref(), Some("CLN-001"));
        assert!(extracted.active);
        assert!(extracted.price.is_none());
    }

    #[test]
    fn test_missing_name_is_a_validation_error() {
        let fields = FieldValues::new().with("email", json!("x@y.z"));
        let err = PartnerProfile.extract(&record(5, fields)).unwrap_err();
        match err {
            SyncError::Validation { field, .. } => assert_eq!(field, "name"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_erp_false_placeholder_name_is_rejected() {
        // the ERP sends `false` for empty text fields
        let fields = FieldValues::new().with("name", json!(false));
        assert!(PartnerProfile.extract(&record(5, fields)).is_err());
    }

    #[test]
    fn test_product_extract_normalizes_price() {
        let fields = FieldValues::new()
            .with("name", json!("LD-CARILLAS"))
            .with("list_price", json!(600.0))
            .with("active", json!(true));

        let extracted = ProductProfile.extract(&record(2, fields)).unwrap();
        assert_eq!(extracted.price.unwrap().to_string(), "600.00");
        assert_eq!(extracted.name, "LD-CARILLAS");
    }

    #[test]
    fn test_staff_extract_maps_work_contact() {
        let fields = FieldValues::new()
            .with("name", json!("Ana Ruiz"))
            .with("work_email", json!("ana@lab.example"))
            .with("active", json!(false));

        let extracted = StaffProfile.extract(&record(9, fields)).unwrap();
        assert_eq!(extracted.email.as_deref(), Some("ana@lab.example"));
        assert!(!extracted.active);
    }

    #[test]
    fn test_profiles_pull_archived_records_too() {
        // deactivations in the ERP must be observable
        for filter in [
            PartnerProfile.base_filter(),
            ProductProfile.base_filter(),
            StaffProfile.base_filter(),
        ] {
            let domain = serde_json::to_string(&filter.to_domain()).unwrap();
            assert!(domain.contains("\"active\",\"in\""), "domain: {domain}");
        }
    }
}
