//! Search filters
//!
//! Structured predicates for ERP searches. Filters are built with the
//! combinators here and serialized to the ERP's prefix-notation domain
//! format (`["&", [f, op, v], [f, op, v]]`) at the wire boundary.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Filter for ERP search operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match records where a field equals a value.
    Equals { field: String, value: Value },

    /// Match records where a field differs from a value.
    NotEquals { field: String, value: Value },

    /// Match records where a text field contains a value (case-insensitive).
    Contains { field: String, value: String },

    /// Match records where a field is greater than a value.
    GreaterThan { field: String, value: Value },

    /// Match records where a field is one of the given values.
    In { field: String, values: Vec<Value> },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equals filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::NotEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a contains (substring) filter.
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::GreaterThan {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an in-set filter.
    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In {
            field: field.into(),
            values,
        }
    }

    /// Create an AND filter.
    #[must_use]
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create an OR filter.
    #[must_use]
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Negate a filter.
    #[must_use]
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Combine this filter with another using AND.
    #[must_use]
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And { mut filters } => {
                filters.push(other);
                Filter::And { filters }
            }
            _ => Filter::And {
                filters: vec![self, other],
            },
        }
    }

    /// Serialize to the ERP's prefix-notation domain array.
    #[must_use]
    pub fn to_domain(&self) -> Value {
        let mut terms = Vec::new();
        self.push_terms(&mut terms);
        Value::Array(terms)
    }

    fn push_terms(&self, out: &mut Vec<Value>) {
        match self {
            Filter::Equals { field, value } => out.push(json!([field, "=", value])),
            Filter::NotEquals { field, value } => out.push(json!([field, "!=", value])),
            Filter::Contains { field, value } => out.push(json!([field, "ilike", value])),
            Filter::GreaterThan { field, value } => out.push(json!([field, ">", value])),
            Filter::In { field, values } => out.push(json!([field, "in", values])),
            Filter::And { filters } => Self::push_compound("&", filters, out),
            Filter::Or { filters } => Self::push_compound("|", filters, out),
            Filter::Not { filter } => {
                out.push(Value::String("!".to_string()));
                filter.push_terms(out);
            }
        }
    }

    // Prefix notation: a compound of n operands needs n-1 operators.
    fn push_compound(op: &str, filters: &[Filter], out: &mut Vec<Value>) {
        if filters.is_empty() {
            return;
        }
        for _ in 1..filters.len() {
            out.push(Value::String(op.to_string()));
        }
        for filter in filters {
            filter.push_terms(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_equals_domain() {
        let domain = Filter::eq("is_company", true).to_domain();
        assert_eq!(domain, json!([["is_company", "=", true]]));
    }

    #[test]
    fn test_and_flattens_with_explicit_operators() {
        let domain = Filter::and(vec![
            Filter::eq("active", true),
            Filter::gt("customer_rank", 0),
        ])
        .to_domain();
        assert_eq!(
            domain,
            json!(["&", ["active", "=", true], ["customer_rank", ">", 0]])
        );
    }

    #[test]
    fn test_or_of_three_emits_two_operators() {
        let domain = Filter::or(vec![
            Filter::eq("a", 1),
            Filter::eq("b", 2),
            Filter::eq("c", 3),
        ])
        .to_domain();
        assert_eq!(
            domain,
            json!(["|", "|", ["a", "=", 1], ["b", "=", 2], ["c", "=", 3]])
        );
    }

    #[test]
    fn test_nested_compound_stays_prefix_correct() {
        let domain = Filter::and(vec![
            Filter::eq("active", true),
            Filter::or(vec![Filter::eq("a", 1), Filter::eq("b", 2)]),
        ])
        .to_domain();
        assert_eq!(
            domain,
            json!(["&", ["active", "=", true], "|", ["a", "=", 1], ["b", "=", 2]])
        );
    }

    #[test]
    fn test_not_prefixes_single_operand() {
        let domain = Filter::negate(Filter::eq("active", true)).to_domain();
        assert_eq!(domain, json!(["!", ["active", "=", true]]));
    }

    #[test]
    fn test_and_with_appends_to_existing_and() {
        let base = Filter::eq("active", true).and_with(Filter::eq("sale_ok", true));
        match base {
            Filter::And { ref filters } => assert_eq!(filters.len(), 2),
            _ => panic!("expected And"),
        }
    }
}
