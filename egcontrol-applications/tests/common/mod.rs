//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use egcontrol_applications::{
    ApplicationError, ApplicationResult, CredentialVerifier, MemoryDocumentStore,
    MemorySessionStorage, PersistedSession, RecordQueryService, SessionManager, SessionStorage,
    UserDirectory,
};
use egcontrol_core::{
    store_error, Collection, Document, DocumentQuery, DocumentStore, EgControlConfig,
    EgControlResult, Fields, Precondition, SessionConfig,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Exact-match verifier that counts how often it is asked
#[derive(Default)]
pub struct CountingVerifier {
    calls: AtomicUsize,
}

impl CountingVerifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialVerifier for CountingVerifier {
    fn verify(&self, stored: &str, provided: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        stored == provided
    }
}

/// Memory store that counts calls and can fail or stall on demand
pub struct TestStore {
    pub inner: MemoryDocumentStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    hold_reads: AtomicBool,
    gate: Semaphore,
}

impl Default for TestStore {
    fn default() -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            hold_reads: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }
}

impl TestStore {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every query wait until [`release_read`](Self::release_read)
    pub fn hold_reads(&self) {
        self.hold_reads.store(true, Ordering::SeqCst);
    }

    pub fn release_read(&self) {
        self.gate.add_permits(1);
    }

    async fn before_read(&self) -> EgControlResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.hold_reads.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .expect("gate semaphore closed")
                .forget();
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(store_error!("connection reset by peer", "test_store"));
        }
        Ok(())
    }

    fn before_write(&self) -> EgControlResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(store_error!("quota exceeded", "test_store"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for TestStore {
    async fn add_document(&self, collection: Collection, fields: Fields) -> EgControlResult<String> {
        self.before_write()?;
        self.inner.add_document(collection, fields).await
    }

    async fn get_documents(
        &self,
        collection: Collection,
        query: DocumentQuery,
    ) -> EgControlResult<Vec<Document>> {
        self.before_read().await?;
        self.inner.get_documents(collection, query).await
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: &str,
    ) -> EgControlResult<Option<Document>> {
        self.before_read().await?;
        self.inner.get_document(collection, id).await
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
        precondition: Option<Precondition>,
    ) -> EgControlResult<()> {
        self.before_write()?;
        self.inner
            .update_document(collection, id, fields, precondition)
            .await
    }
}

/// Session storage whose writes and deletes always fail
#[derive(Default)]
pub struct BrokenSessionStorage;

#[async_trait]
impl SessionStorage for BrokenSessionStorage {
    async fn load(&self) -> ApplicationResult<Option<PersistedSession>> {
        Ok(None)
    }

    async fn save(&self, _session: &PersistedSession) -> ApplicationResult<()> {
        Err(ApplicationError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        )))
    }

    async fn clear(&self) -> ApplicationResult<()> {
        Err(ApplicationError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        )))
    }
}

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

/// Insert a user document directly, the way an older client would have
pub async fn seed_user(
    store: &TestStore,
    name: &str,
    email: &str,
    password: &str,
    role: Option<&str>,
) -> String {
    let mut doc = fields(json!({
        "name": name,
        "email": email,
        "password": password,
        "shift": "A",
    }));
    if let Some(role) = role {
        doc.insert("role".to_string(), Value::from(role));
    }
    store
        .inner
        .add_document(Collection::Users, doc)
        .await
        .unwrap()
}

pub fn session_config() -> SessionConfig {
    EgControlConfig::default().session
}

/// Everything a client process holds, wired to shared test doubles
pub struct Harness {
    pub store: Arc<TestStore>,
    pub storage: MemorySessionStorage,
    pub verifier: Arc<CountingVerifier>,
    pub config: SessionConfig,
    pub users: UserDirectory,
    pub session: SessionManager,
    pub records: RecordQueryService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(session_config())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let store = Arc::new(TestStore::default());
        Self::assemble(store, MemorySessionStorage::new(), config)
    }

    fn assemble(store: Arc<TestStore>, storage: MemorySessionStorage, config: SessionConfig) -> Self {
        let verifier = Arc::new(CountingVerifier::default());
        let users = UserDirectory::new(store.clone());
        let session = SessionManager::new(users.clone(), Arc::new(storage.clone()), &config)
            .with_verifier(verifier.clone());
        let records = RecordQueryService::new(store.clone(), 3);
        Self {
            store,
            storage,
            verifier,
            config,
            users,
            session,
            records,
        }
    }

    /// A fresh process on the same device: same store and session slot, nothing in memory
    pub fn restart(&self) -> Self {
        Self::assemble(self.store.clone(), self.storage.clone(), self.config.clone())
    }
}
