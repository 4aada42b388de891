//! Core data type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Field map of a stored document
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Logical collections held by the document store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    EgRecords,
    ObjectRecords,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::EgRecords => "eg_records",
            Collection::ObjectRecords => "object_records",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A document as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// String field, `None` when missing or not a string
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    /// Integer field, `None` when missing or not an integer
    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(|v| v.as_i64())
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgControlConfig {
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub records: RecordsConfig,
    pub logging: crate::logging::LoggingConfig,
}

/// Which document store adapter to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite connection string, e.g. `sqlite://egcontrol.db?mode=rwc`
    pub database_url: Option<String>,
}

/// What login does when several user documents share one email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateEmailPolicy {
    /// Fail the login with an explicit ambiguity error
    Reject,
    /// Use the first document the store returns
    FirstMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the persisted session snapshot
    pub storage_dir: PathBuf,
    /// Lifetime of a persisted session
    pub ttl_hours: u32,
    /// HMAC secret used to sign the persisted snapshot
    pub signing_secret: String,
    pub duplicate_email_policy: DuplicateEmailPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// How many records the "recent" views show
    pub recent_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_field_accessors() {
        let mut fields = Fields::new();
        fields.insert("code".to_string(), json!("123456789012345678"));
        fields.insert("trip_number".to_string(), json!(4411));
        let doc = Document::new("abc", fields);

        assert_eq!(doc.str_field("code"), Some("123456789012345678"));
        assert_eq!(doc.i64_field("trip_number"), Some(4411));
        assert_eq!(doc.str_field("trip_number"), None);
        assert_eq!(doc.str_field("missing"), None);
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::Users.name(), "users");
        assert_eq!(Collection::EgRecords.to_string(), "eg_records");
        assert_eq!(Collection::ObjectRecords.name(), "object_records");
    }
}
