//! In-memory document store

use async_trait::async_trait;
use egcontrol_core::{
    compare_values, not_found_error, Collection, Document, DocumentQuery, DocumentStore,
    EgControlError, EgControlResult, ErrorContext, Fields, Precondition, SortDirection,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Document store kept in process memory, in insertion order per collection
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<Collection, Vec<Document>>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Missing fields sort before any present value
fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    match (a.fields.get(field), b.fields.get(field)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn add_document(&self, collection: Collection, fields: Fields) -> EgControlResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection)
            .or_default()
            .push(Document::new(id.clone(), fields));
        debug!("Added document {} to {}", id, collection);
        Ok(id)
    }

    async fn get_documents(
        &self,
        collection: Collection,
        query: DocumentQuery,
    ) -> EgControlResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut documents: Vec<Document> = collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| query.filters.iter().all(|f| f.matches(doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // sort_by is stable, so ties keep insertion order
        if let Some(order) = &query.order_by {
            match order.direction {
                SortDirection::Ascending => {
                    documents.sort_by(|a, b| compare_field(a, b, &order.field))
                }
                SortDirection::Descending => {
                    documents.sort_by(|a, b| compare_field(b, a, &order.field))
                }
            }
        }

        if let Some(limit) = query.limit {
            documents.truncate(limit);
        }

        Ok(documents)
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: &str,
    ) -> EgControlResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .cloned())
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
        precondition: Option<Precondition>,
    ) -> EgControlResult<()> {
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
            .ok_or_else(|| not_found_error!(format!("{}/{}", collection, id), "memory_store"))?;

        if let Some(precondition) = precondition {
            if !precondition.holds(document) {
                return Err(EgControlError::PreconditionFailed {
                    collection: collection.to_string(),
                    document_id: id.to_string(),
                    message: format!("{} changed since it was read", precondition.field),
                    context: ErrorContext::new("memory_store").with_operation("update_document"),
                });
            }
        }

        document.fields.extend(fields);
        debug!("Updated document {} in {}", id, collection);
        Ok(())
    }
}
