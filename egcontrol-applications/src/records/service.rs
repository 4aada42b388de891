//! Record Query Service - validated writes and recency-ordered reads
//!
//! EG and Object records share one pattern: validate, stamp, append; read back
//! newest first.

use super::types::{EgRecord, NewObjectRecord, ObjectRecord, SearchOutcome, TrackedRecord};
use super::validation::{validate_eg_code, validate_object};
use crate::auth::UserIdentity;
use crate::{ApplicationError, ApplicationResult};
use chrono::{DateTime, Local, TimeZone, Utc};
use egcontrol_core::logging::performance::measure_async;
use egcontrol_core::{
    log_operation_error, Document, DocumentQuery, DocumentStore, FieldFilter, OrderBy,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads and writes EG and Object records
pub struct RecordQueryService {
    store: Arc<dyn DocumentStore>,
    recent_limit: usize,
    /// Last timestamp handed out, in microseconds
    last_stamp: AtomicI64,
}

impl RecordQueryService {
    pub fn new(store: Arc<dyn DocumentStore>, recent_limit: usize) -> Self {
        Self {
            store,
            recent_limit,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    /// Default size of the "recent" views
    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    /// Current time, strictly after every earlier stamp from this service
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let stamp = |last: i64| now.max(last.saturating_add(1));
        let previous = match self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(stamp(last)))
        {
            Ok(previous) | Err(previous) => previous,
        };
        let micros = stamp(previous);
        DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
    }

    async fn append<R: TrackedRecord>(&self, record: R) -> ApplicationResult<String> {
        self.store
            .add_document(R::COLLECTION, record.to_fields())
            .await
            .map_err(|e| {
                let collection = R::COLLECTION;
                log_operation_error!("append_record", e, collection = %collection);
                ApplicationError::write(collection, e)
            })
    }

    async fn fetch<R: TrackedRecord>(&self, query: DocumentQuery) -> ApplicationResult<Vec<R>> {
        let docs = self
            .store
            .get_documents(R::COLLECTION, query)
            .await
            .map_err(|e| ApplicationError::read(R::COLLECTION, e))?;
        Ok(parse_documents(&docs))
    }

    /// Register an EG code
    pub async fn create_eg(&self, code: &str, author: &UserIdentity) -> ApplicationResult<EgRecord> {
        let code = validate_eg_code(code)?;

        let mut record = EgRecord {
            id: String::new(),
            code: code.to_string(),
            entered_by: author.name.clone(),
            timestamp: self.next_timestamp(),
        };
        record.id = self.append(record.clone()).await?;

        info!("EG record {} registered by {}", record.id, author.id);
        Ok(record)
    }

    /// Register an object code with its trip number
    pub async fn create_object(
        &self,
        input: &NewObjectRecord,
        author: &UserIdentity,
    ) -> ApplicationResult<ObjectRecord> {
        let (object_code, trip_number) = validate_object(input)?;

        let mut record = ObjectRecord {
            id: String::new(),
            object_code,
            trip_number,
            entered_by: author.name.clone(),
            timestamp: self.next_timestamp(),
        };
        record.id = self.append(record.clone()).await?;

        info!("Object record {} registered by {}", record.id, author.id);
        Ok(record)
    }

    /// The newest records of a kind; `None` uses the configured limit
    pub async fn list_recent<R: TrackedRecord>(
        &self,
        limit: Option<usize>,
    ) -> ApplicationResult<Vec<R>> {
        let limit = limit.unwrap_or(self.recent_limit);
        self.fetch(
            DocumentQuery::all()
                .order_by(OrderBy::desc("timestamp"))
                .limit(limit),
        )
        .await
    }

    /// EG records whose code contains `query`, or whose author name contains it ignoring case
    ///
    /// Scans the whole collection.
    pub async fn search_eg(&self, query: &str) -> ApplicationResult<SearchOutcome<EgRecord>> {
        if query.trim().is_empty() {
            return Ok(SearchOutcome::Cleared);
        }

        let all: Vec<EgRecord> = measure_async(
            "search_eg_scan",
            self.fetch(DocumentQuery::all().order_by(OrderBy::desc("timestamp"))),
        )
        .await?;

        let needle = query.to_lowercase();
        let matches: Vec<EgRecord> = all
            .into_iter()
            .filter(|r| r.code.contains(query) || r.entered_by.to_lowercase().contains(&needle))
            .collect();

        debug!("EG search matched {} records", matches.len());
        Ok(SearchOutcome::Matches(matches))
    }

    /// Object records whose code equals the trimmed `query`, newest first
    pub async fn search_objects(
        &self,
        query: &str,
    ) -> ApplicationResult<SearchOutcome<ObjectRecord>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchOutcome::Cleared);
        }

        let mut matches: Vec<ObjectRecord> = self
            .fetch(DocumentQuery::all().filter(FieldFilter::eq("object_code", query)))
            .await?;
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        debug!("Object search matched {} records", matches.len());
        Ok(SearchOutcome::Matches(matches))
    }

    /// Number of records of a kind stamped at or after `since`
    pub async fn count_since<R: TrackedRecord>(
        &self,
        since: DateTime<Utc>,
    ) -> ApplicationResult<usize> {
        let docs = self
            .store
            .get_documents(
                R::COLLECTION,
                DocumentQuery::all().filter(FieldFilter::gte("timestamp", since.timestamp_micros())),
            )
            .await
            .map_err(|e| ApplicationError::read(R::COLLECTION, e))?;
        Ok(docs.len())
    }

    /// Number of records of a kind stamped since local midnight
    pub async fn count_today<R: TrackedRecord>(&self) -> ApplicationResult<usize> {
        self.count_since::<R>(local_midnight()).await
    }
}

fn parse_documents<R: TrackedRecord>(docs: &[Document]) -> Vec<R> {
    docs.iter()
        .filter_map(|doc| {
            let parsed = R::from_document(doc);
            if parsed.is_none() {
                warn!("Skipping malformed document {}/{}", R::COLLECTION, doc.id);
            }
            parsed
        })
        .collect()
}

/// Start of the current local day, in UTC
fn local_midnight() -> DateTime<Utc> {
    let today = Local::now().date_naive();
    let midnight = today.and_time(chrono::NaiveTime::MIN);
    match Local.from_local_datetime(&midnight).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&midnight),
    }
}
