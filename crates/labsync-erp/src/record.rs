//! Wire-level record types
//!
//! External records are opaque field maps snapshotted from the ERP for the
//! duration of one sync pass; they are never persisted.

use labsync_core::ExternalId;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Monetary values are normalized to two decimal places before any
/// comparison or storage, so float drift in the ERP payload never causes
/// spurious update-vs-no-op flapping.
pub const MONEY_SCALE: u32 = 2;

/// A field-keyed payload as returned by the ERP.
///
/// Wraps a JSON object and offers typed getters that absorb the ERP's
/// loose typing (`false` standing in for null, floats for money, numeric
/// strings for ids).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues(Map<String, Value>);

impl FieldValues {
    /// Create an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a raw JSON object.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Set a field using the builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Set a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Raw value of a field, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// A non-empty string value.
    ///
    /// The ERP encodes absent text fields as `false`; both that and the
    /// empty string read as `None` here.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// A boolean value; absent fields read as `None`.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// An integer value.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// A monetary value, normalized to [`MONEY_SCALE`] decimal places.
    ///
    /// Accepts JSON numbers and numeric strings.
    #[must_use]
    pub fn get_decimal(&self, name: &str) -> Option<Decimal> {
        let raw = self.0.get(name)?;
        let value = match raw {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Decimal::from(i))
                } else {
                    n.as_f64().and_then(Decimal::from_f64)
                }
            }
            Value::String(s) => Decimal::from_str(s).ok(),
            _ => None,
        }?;
        let mut normalized = value.round_dp(MONEY_SCALE);
        normalized.rescale(MONEY_SCALE);
        Some(normalized)
    }

    /// Whether a field is present at all.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying JSON object.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// One record pulled from the ERP: its external id plus the requested
/// fields. Immutable snapshot, ephemeral per sync pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRecord {
    /// The ERP's identifier for this record.
    pub id: ExternalId,
    /// The requested field values.
    pub fields: FieldValues,
}

impl ExternalRecord {
    /// Create a record from an id and its fields.
    pub fn new(id: impl Into<ExternalId>, fields: FieldValues) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    /// Records in the order the ERP returned them.
    pub records: Vec<ExternalRecord>,
    /// Whether another page may follow.
    pub has_more: bool,
}

impl RecordPage {
    /// An empty terminal page.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Offset-based pagination window for a search call.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    /// Number of records to skip.
    pub offset: u32,
    /// Maximum number of records in this page.
    pub limit: u32,
}

impl PageRequest {
    /// First page with the given page size.
    #[must_use]
    pub fn first(limit: u32) -> Self {
        Self { offset: 0, limit }
    }

    /// The window immediately after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> FieldValues {
        match value {
            Value::Object(map) => FieldValues::from_map(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_get_str_treats_false_as_absent() {
        let f = fields(json!({"name": "LD-CARILLAS", "email": false, "ref": ""}));
        assert_eq!(f.get_str("name"), Some("LD-CARILLAS"));
        assert_eq!(f.get_str("email"), None);
        assert_eq!(f.get_str("ref"), None);
    }

    #[test]
    fn test_get_decimal_normalizes_float_drift() {
        let f = fields(json!({"a": 600.0000000001, "b": 600.00}));
        assert_eq!(f.get_decimal("a"), f.get_decimal("b"));
        assert_eq!(f.get_decimal("a").unwrap().to_string(), "600.00");
    }

    #[test]
    fn test_get_decimal_accepts_integers_and_strings() {
        let f = fields(json!({"int": 600, "text": "12.345"}));
        assert_eq!(f.get_decimal("int").unwrap().to_string(), "600.00");
        // rounded to the money scale, banker's rounding
        assert_eq!(f.get_decimal("text").unwrap().to_string(), "12.34");
    }

    #[test]
    fn test_page_request_advances_by_limit() {
        let page = PageRequest::first(100);
        let next = page.next();
        assert_eq!(next.offset, 100);
        assert_eq!(next.limit, 100);
    }
}
