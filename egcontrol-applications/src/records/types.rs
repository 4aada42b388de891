//! Record types

use chrono::{DateTime, Utc};
use egcontrol_core::{Collection, Document, Fields};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An append-only record kept in its own collection
pub trait TrackedRecord: Sized + Send {
    const COLLECTION: Collection;

    /// Parse a stored document; `None` when required fields are missing
    fn from_document(doc: &Document) -> Option<Self>;

    fn to_fields(&self) -> Fields;

    fn timestamp(&self) -> DateTime<Utc>;
}

/// Stored timestamps are integer microseconds since the Unix epoch
pub(crate) fn timestamp_from_document(doc: &Document) -> Option<DateTime<Utc>> {
    doc.i64_field("timestamp")
        .and_then(DateTime::<Utc>::from_timestamp_micros)
}

/// An EG code entered by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgRecord {
    pub id: String,
    /// Exactly 18 ASCII digits
    pub code: String,
    /// Display name of the user who entered the record
    pub entered_by: String,
    pub timestamp: DateTime<Utc>,
}

impl TrackedRecord for EgRecord {
    const COLLECTION: Collection = Collection::EgRecords;

    fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: doc.id.clone(),
            code: doc.str_field("code")?.to_string(),
            entered_by: doc.str_field("entered_by").unwrap_or_default().to_string(),
            timestamp: timestamp_from_document(doc)?,
        })
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("code".to_string(), Value::from(self.code.clone()));
        fields.insert("entered_by".to_string(), Value::from(self.entered_by.clone()));
        fields.insert(
            "timestamp".to_string(),
            Value::from(self.timestamp.timestamp_micros()),
        );
        fields
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// An object code and trip number entered by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: String,
    /// 1 to 18 ASCII digits
    pub object_code: String,
    /// At most 7 digits
    pub trip_number: u32,
    pub entered_by: String,
    pub timestamp: DateTime<Utc>,
}

impl TrackedRecord for ObjectRecord {
    const COLLECTION: Collection = Collection::ObjectRecords;

    fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: doc.id.clone(),
            object_code: doc.str_field("object_code")?.to_string(),
            trip_number: u32::try_from(doc.i64_field("trip_number")?).ok()?,
            entered_by: doc.str_field("entered_by").unwrap_or_default().to_string(),
            timestamp: timestamp_from_document(doc)?,
        })
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("object_code".to_string(), Value::from(self.object_code.clone()));
        fields.insert("trip_number".to_string(), Value::from(self.trip_number));
        fields.insert("entered_by".to_string(), Value::from(self.entered_by.clone()));
        fields.insert(
            "timestamp".to_string(),
            Value::from(self.timestamp.timestamp_micros()),
        );
        fields
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Raw object form input, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewObjectRecord {
    pub object_code: String,
    pub trip_number: String,
}

impl NewObjectRecord {
    pub fn new(object_code: impl Into<String>, trip_number: impl Into<String>) -> Self {
        Self {
            object_code: object_code.into(),
            trip_number: trip_number.into(),
        }
    }
}

/// Result of a search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome<T> {
    /// The query was blank; the caller should clear its results
    Cleared,
    /// Matches, newest first; may be empty
    Matches(Vec<T>),
}

impl<T> SearchOutcome<T> {
    /// Matches as a slice, empty for `Cleared`
    pub fn matches(&self) -> &[T] {
        match self {
            SearchOutcome::Cleared => &[],
            SearchOutcome::Matches(items) => items,
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, SearchOutcome::Cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => Document::new("r1", map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_object_record_from_document() {
        let doc = document(json!({
            "object_code": "4411",
            "trip_number": 27,
            "entered_by": "Ana",
            "timestamp": 1_700_000_000_000_000i64
        }));
        let record = ObjectRecord::from_document(&doc).unwrap();

        assert_eq!(record.object_code, "4411");
        assert_eq!(record.trip_number, 27);
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(record.to_fields(), doc.fields);
    }

    #[test]
    fn test_incomplete_document_is_skipped() {
        let doc = document(json!({ "entered_by": "Ana", "timestamp": 5 }));
        assert!(EgRecord::from_document(&doc).is_none());

        let negative_trip = document(json!({
            "object_code": "1",
            "trip_number": -3,
            "timestamp": 5
        }));
        assert!(ObjectRecord::from_document(&negative_trip).is_none());
    }

    #[test]
    fn test_search_outcome_matches() {
        let cleared: SearchOutcome<u8> = SearchOutcome::Cleared;
        assert!(cleared.is_cleared());
        assert!(cleared.matches().is_empty());
        assert_eq!(SearchOutcome::Matches(vec![1, 2]).matches(), &[1, 2]);
    }
}
