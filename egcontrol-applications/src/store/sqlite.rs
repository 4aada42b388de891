//! SQLite-backed document store
//!
//! Every collection lives in one `documents` table; fields are stored as a JSON
//! text column and filtered/ordered with `json_extract`.

use async_trait::async_trait;
use egcontrol_core::{
    not_found_error, store_error, validation_error, Collection, Document, DocumentQuery,
    DocumentStore, EgControlError, EgControlResult, ErrorContext, FilterOp, Fields, Precondition,
    SortDirection,
};
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool};
use sqlx::Row;
use tracing::{debug, info};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Document store persisted in an SQLite database
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and create the schema if needed
    pub async fn from_url(database_url: &str) -> EgControlResult<Self> {
        let pool = SqlitePool::connect(database_url).await.map_err(|e| {
            store_error!(
                format!("Failed to connect to {}: {}", database_url, e),
                "sqlite_store",
                e
            )
        })?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!("SQLite document store ready at {}", database_url);
        Ok(store)
    }

    /// Create the documents table
    pub async fn migrate(&self) -> EgControlResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields TEXT NOT NULL,
                UNIQUE (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| store_error!(format!("Failed to create documents table: {}", e), "sqlite_store", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)")
            .execute(&self.pool)
            .await
            .map_err(|e| store_error!(format!("Failed to create index: {}", e), "sqlite_store", e))?;

        Ok(())
    }

    fn parse_fields(raw: &str) -> EgControlResult<Fields> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(map),
            other => Err(store_error!(
                format!("Stored document is not an object: {}", other),
                "sqlite_store"
            )),
        }
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> EgControlResult<Document> {
        let id: String = row
            .try_get("id")
            .map_err(|e| store_error!(format!("Failed to read id: {}", e), "sqlite_store", e))?;
        let raw: String = row
            .try_get("fields")
            .map_err(|e| store_error!(format!("Failed to read fields: {}", e), "sqlite_store", e))?;
        Ok(Document::new(id, Self::parse_fields(&raw)?))
    }
}

/// JSON path for a top-level field; only plain identifiers are accepted
fn json_path(field: &str) -> EgControlResult<String> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(validation_error!(
            format!("Unsupported field name: {:?}", field),
            field,
            "sqlite_store"
        ));
    }
    Ok(format!("$.{}", field))
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::String(s) => query.bind(s.clone()),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::Null => query.bind(Option::<String>::None),
        other => query.bind(other.to_string()),
    }
}

fn operator_sql(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "=",
        FilterOp::Gte => ">=",
        FilterOp::Lt => "<",
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn add_document(&self, collection: Collection, fields: Fields) -> EgControlResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let raw = serde_json::to_string(&fields)?;

        sqlx::query("INSERT INTO documents (collection, id, fields) VALUES (?, ?, ?)")
            .bind(collection.name())
            .bind(&id)
            .bind(raw)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                store_error!(format!("Failed to add document to {}: {}", collection, e), "sqlite_store", e)
            })?;

        debug!("Added document {} to {}", id, collection);
        Ok(id)
    }

    async fn get_documents(
        &self,
        collection: Collection,
        query: DocumentQuery,
    ) -> EgControlResult<Vec<Document>> {
        let mut sql = String::from("SELECT id, fields FROM documents WHERE collection = ?");
        let mut paths = Vec::with_capacity(query.filters.len());
        for filter in &query.filters {
            paths.push(json_path(&filter.field)?);
            sql.push_str(&format!(
                " AND json_extract(fields, ?) {} ?",
                operator_sql(filter.op)
            ));
        }

        let order_path = match &query.order_by {
            Some(order) => {
                let direction = match order.direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                };
                sql.push_str(&format!(
                    " ORDER BY json_extract(fields, ?) {}, seq ASC",
                    direction
                ));
                Some(json_path(&order.field)?)
            }
            None => {
                sql.push_str(" ORDER BY seq ASC");
                None
            }
        };

        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut statement = sqlx::query(&sql).bind(collection.name());
        for (filter, path) in query.filters.iter().zip(paths) {
            statement = statement.bind(path);
            statement = bind_value(statement, &filter.value);
        }
        if let Some(path) = order_path {
            statement = statement.bind(path);
        }
        if let Some(limit) = query.limit {
            statement = statement.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = statement.fetch_all(&self.pool).await.map_err(|e| {
            store_error!(format!("Failed to query {}: {}", collection, e), "sqlite_store", e)
        })?;

        rows.iter().map(Self::row_to_document).collect()
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: &str,
    ) -> EgControlResult<Option<Document>> {
        let row = sqlx::query("SELECT id, fields FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.name())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                store_error!(format!("Failed to load {}/{}: {}", collection, id, e), "sqlite_store", e)
            })?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
        precondition: Option<Precondition>,
    ) -> EgControlResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            store_error!(format!("Failed to begin transaction: {}", e), "sqlite_store", e)
        })?;

        let row = sqlx::query("SELECT id, fields FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.name())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                store_error!(format!("Failed to load {}/{}: {}", collection, id, e), "sqlite_store", e)
            })?;

        let mut document = match row {
            Some(row) => Self::row_to_document(&row)?,
            None => {
                return Err(not_found_error!(
                    format!("{}/{}", collection, id),
                    "sqlite_store"
                ))
            }
        };

        if let Some(precondition) = precondition {
            if !precondition.holds(&document) {
                return Err(EgControlError::PreconditionFailed {
                    collection: collection.to_string(),
                    document_id: id.to_string(),
                    message: format!("{} changed since it was read", precondition.field),
                    context: ErrorContext::new("sqlite_store").with_operation("update_document"),
                });
            }
        }

        document.fields.extend(fields);
        let raw = serde_json::to_string(&document.fields)?;

        sqlx::query("UPDATE documents SET fields = ? WHERE collection = ? AND id = ?")
            .bind(raw)
            .bind(collection.name())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                store_error!(format!("Failed to update {}/{}: {}", collection, id, e), "sqlite_store", e)
            })?;

        tx.commit().await.map_err(|e| {
            store_error!(format!("Failed to commit update: {}", e), "sqlite_store", e)
        })?;

        debug!("Updated document {} in {}", id, collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egcontrol_core::{FieldFilter, OrderBy};
    use serde_json::json;

    async fn temp_store() -> (tempfile::TempDir, SqliteDocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let store = SqliteDocumentStore::from_url(&url).await.unwrap();
        (dir, store)
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[tokio::test]
    async fn test_filter_order_limit() {
        let (_dir, store) = temp_store().await;
        for (code, ts) in [("a", 10), ("b", 30), ("a", 20), ("c", 40)] {
            store
                .add_document(
                    Collection::ObjectRecords,
                    fields(json!({ "object_code": code, "timestamp": ts })),
                )
                .await
                .unwrap();
        }

        let docs = store
            .get_documents(
                Collection::ObjectRecords,
                DocumentQuery::all()
                    .filter(FieldFilter::eq("object_code", "a"))
                    .order_by(OrderBy::desc("timestamp")),
            )
            .await
            .unwrap();
        let stamps: Vec<i64> = docs.iter().filter_map(|d| d.i64_field("timestamp")).collect();
        assert_eq!(stamps, vec![20, 10]);

        let newest = store
            .get_documents(
                Collection::ObjectRecords,
                DocumentQuery::all()
                    .order_by(OrderBy::desc("timestamp"))
                    .limit(2),
            )
            .await
            .unwrap();
        let stamps: Vec<i64> = newest.iter().filter_map(|d| d.i64_field("timestamp")).collect();
        assert_eq!(stamps, vec![40, 30]);

        let since = store
            .get_documents(
                Collection::ObjectRecords,
                DocumentQuery::all().filter(FieldFilter::gte("timestamp", 20)),
            )
            .await
            .unwrap();
        assert_eq!(since.len(), 3);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let (_dir, store) = temp_store().await;
        store
            .add_document(Collection::Users, fields(json!({ "email": "a@x.com" })))
            .await
            .unwrap();

        let records = store
            .get_documents(Collection::EgRecords, DocumentQuery::all())
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_checks_revision() {
        let (_dir, store) = temp_store().await;
        let id = store
            .add_document(
                Collection::Users,
                fields(json!({ "name": "Ana", "password": "x", "revision": 0 })),
            )
            .await
            .unwrap();

        store
            .update_document(
                Collection::Users,
                &id,
                fields(json!({ "name": "Ana Maria", "revision": 1 })),
                Some(Precondition::field_equals("revision", 0)),
            )
            .await
            .unwrap();

        let doc = store
            .get_document(Collection::Users, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.str_field("name"), Some("Ana Maria"));
        assert_eq!(doc.str_field("password"), Some("x"));

        let stale = store
            .update_document(
                Collection::Users,
                &id,
                fields(json!({ "name": "Other" })),
                Some(Precondition::field_equals("revision", 0)),
            )
            .await;
        assert!(matches!(stale, Err(EgControlError::PreconditionFailed { .. })));
    }

    #[tokio::test]
    async fn test_rejects_unsafe_field_names() {
        let (_dir, store) = temp_store().await;
        let result = store
            .get_documents(
                Collection::Users,
                DocumentQuery::all().filter(FieldFilter::eq("email') OR 1=1 --", "x")),
            )
            .await;
        assert!(matches!(result, Err(EgControlError::Validation { .. })));
    }
}
