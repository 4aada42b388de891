//! Core trait definitions

use crate::error::EgControlResult;
use crate::types::{Collection, Document, Fields};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison applied by a [`FieldFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lt,
}

/// Condition on a top-level document field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Gte,
            value: value.into(),
        }
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Lt,
            value: value.into(),
        }
    }

    /// Evaluate the filter against a document; missing fields never match
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.fields.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => compare_values(actual, &self.value) == Some(Ordering::Equal),
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Descending,
        }
    }

    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Ascending,
        }
    }
}

/// Shape of a `get_documents` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Condition an update must satisfy before it is applied
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub field: String,
    pub expected: Value,
}

impl Precondition {
    pub fn field_equals(field: &str, expected: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            expected: expected.into(),
        }
    }

    /// A missing field is treated as `0` so documents written before revisions existed can be updated
    pub fn holds(&self, doc: &Document) -> bool {
        let zero = Value::from(0);
        let actual = doc.fields.get(&self.field).unwrap_or(&zero);
        compare_values(actual, &self.expected) == Some(Ordering::Equal)
    }
}

/// Order two JSON scalars; `None` when they are not comparable
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Remote document store holding named collections
///
/// Results are returned in the store's natural (insertion) order unless the
/// query carries an ordering; ties in the ordering keep natural order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Add a document and return its generated id
    async fn add_document(&self, collection: Collection, fields: Fields) -> EgControlResult<String>;

    /// Fetch documents matching a query
    async fn get_documents(
        &self,
        collection: Collection,
        query: DocumentQuery,
    ) -> EgControlResult<Vec<Document>>;

    /// Fetch a single document by id
    async fn get_document(&self, collection: Collection, id: &str)
        -> EgControlResult<Option<Document>>;

    /// Merge `fields` into an existing document
    ///
    /// Fails with `NotFound` for an unknown id and `PreconditionFailed` when the
    /// precondition does not hold.
    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
        precondition: Option<Precondition>,
    ) -> EgControlResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(fields: Value) -> Document {
        let Value::Object(map) = fields else {
            panic!("fixture must be an object")
        };
        Document::new("d1", map)
    }

    #[test]
    fn test_filter_operators() {
        let d = doc(json!({"timestamp": 100, "email": "a@b.c"}));

        assert!(FieldFilter::eq("email", "a@b.c").matches(&d));
        assert!(!FieldFilter::eq("email", "A@b.c").matches(&d));
        assert!(FieldFilter::gte("timestamp", 100).matches(&d));
        assert!(!FieldFilter::gte("timestamp", 101).matches(&d));
        assert!(FieldFilter::lt("timestamp", 101).matches(&d));
        assert!(!FieldFilter::eq("missing", "x").matches(&d));
    }

    #[test]
    fn test_mismatched_types_do_not_match() {
        let d = doc(json!({"object_code": "42"}));
        assert!(!FieldFilter::eq("object_code", 42).matches(&d));
    }

    #[test]
    fn test_precondition_defaults_missing_field_to_zero() {
        let d = doc(json!({"name": "Ana"}));
        assert!(Precondition::field_equals("revision", 0).holds(&d));
        assert!(!Precondition::field_equals("revision", 1).holds(&d));
    }
}
