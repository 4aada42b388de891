//! EG Control Applications - session, record and user services
//!
//! This crate builds the user-facing behavior on top of the document store
//! port defined in egcontrol-core. It includes:
//!
//! - Login, logout and restart-surviving sessions
//! - Validated registration and search of EG and Object records
//! - Administrator user management
//!
//! ## Architecture
//!
//! - **Core** (egcontrol-core): configuration, errors, logging, store port
//! - **Applications** (this crate): services and store adapters
//! - **Presentation** (egcontrol-cli): operator command line

pub mod auth;
pub mod records;
pub mod session;
pub mod store;
pub mod users;

pub use auth::{CredentialVerifier, PlainTextVerifier, Role, UserIdentity};
pub use records::{
    normalize_digits, EgRecord, NewObjectRecord, ObjectRecord, RecordQueryService,
    SearchOutcome, TrackedRecord,
};
pub use session::{
    FileSessionStorage, MemorySessionStorage, PersistedSession, SessionManager, SessionSigner,
    SessionState, SessionStorage,
};
pub use store::MemoryDocumentStore;
#[cfg(feature = "sqlite")]
pub use store::SqliteDocumentStore;
pub use users::{NewUser, UserDirectory, UserProfile, UserUpdate};

use egcontrol_core::{Collection, DocumentStore, EgControlConfig, EgControlError, StoreBackend};
use std::sync::Arc;
use tracing::info;

/// Application-level error type
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Failed to write to {collection}: {source}")]
    Write {
        collection: Collection,
        #[source]
        source: EgControlError,
    },

    #[error("Failed to read from {collection}: {source}")]
    Read {
        collection: Collection,
        #[source]
        source: EgControlError,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("{count} accounts are registered with {email}")]
    AmbiguousAccount { email: String, count: usize },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Core error: {0}")]
    Core(#[from] EgControlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;

impl ApplicationError {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a validation error for one input field
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an authorization error
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a session error
    pub fn session<S: Into<String>>(message: S) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Wrap a failed store read
    pub fn read(collection: Collection, source: EgControlError) -> Self {
        Self::Read { collection, source }
    }

    /// Wrap a failed store write
    pub fn write(collection: Collection, source: EgControlError) -> Self {
        Self::Write { collection, source }
    }

    /// Whether the store itself failed, as opposed to the request being rejected
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Write { .. })
    }

    /// Message suitable for showing to the person at the terminal
    ///
    /// Store and internal failures are reduced to a generic notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { message } => message.clone(),
            Self::InvalidCredentials => "Incorrect password".to_string(),
            Self::Validation { message, .. } => message.clone(),
            Self::Write { collection, .. } => {
                format!("Could not save {}. Please try again.", collection_label(*collection))
            }
            Self::Read { collection, .. } => {
                format!("Could not load {}. Please try again.", collection_label(*collection))
            }
            Self::Unauthorized { .. } => "You do not have permission to do this".to_string(),
            Self::Conflict { message } => message.clone(),
            Self::AmbiguousAccount { .. } => {
                "Several accounts share this email. Contact an administrator.".to_string()
            }
            Self::Session { message } => message.clone(),
            Self::Core(_) | Self::Io(_) | Self::Serialization(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

fn collection_label(collection: Collection) -> &'static str {
    match collection {
        Collection::Users => "users",
        Collection::EgRecords => "EG records",
        Collection::ObjectRecords => "object records",
    }
}

/// Main EG Control application service
pub struct EgControlApplication {
    store: Arc<dyn DocumentStore>,
    session: SessionManager,
    records: RecordQueryService,
    users: UserDirectory,
    config: EgControlConfig,
}

/// Builder for EgControlApplication to simplify initialization
pub struct EgControlApplicationBuilder {
    config: EgControlConfig,
    store: Option<Arc<dyn DocumentStore>>,
    session_storage: Option<Arc<dyn SessionStorage>>,
    verifier: Option<Arc<dyn CredentialVerifier>>,
    restore_session: bool,
}

impl EgControlApplicationBuilder {
    /// Create a new builder with the given configuration
    pub fn new(config: EgControlConfig) -> Self {
        Self {
            config,
            store: None,
            session_storage: None,
            verifier: None,
            restore_session: true,
        }
    }

    /// Use an existing document store instead of the configured backend
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom session storage instead of the session file
    pub fn with_session_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.session_storage = Some(storage);
        self
    }

    /// Use a custom credential verifier
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Enable or disable restoring the persisted session on build
    pub fn with_restore(mut self, enable: bool) -> Self {
        self.restore_session = enable;
        self
    }

    /// Build the EgControlApplication
    pub async fn build(self) -> ApplicationResult<EgControlApplication> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => Self::create_store(&self.config).await?,
        };

        let session_storage: Arc<dyn SessionStorage> = match self.session_storage {
            Some(storage) => storage,
            None => Arc::new(FileSessionStorage::new(&self.config.session.storage_dir)),
        };

        let users = UserDirectory::new(store.clone());
        let mut session = SessionManager::new(users.clone(), session_storage, &self.config.session);
        if let Some(verifier) = self.verifier {
            session = session.with_verifier(verifier);
        }
        let records = RecordQueryService::new(store.clone(), self.config.records.recent_limit);

        if self.restore_session {
            if let Some(user) = session.restore().await {
                info!("Restored session for {}", user.email);
            }
        }

        Ok(EgControlApplication {
            store,
            session,
            records,
            users,
            config: self.config,
        })
    }

    async fn create_store(config: &EgControlConfig) -> ApplicationResult<Arc<dyn DocumentStore>> {
        match config.store.backend {
            StoreBackend::Memory => {
                info!("Using in-memory document store");
                Ok(Arc::new(MemoryDocumentStore::new()))
            }
            #[cfg(feature = "sqlite")]
            StoreBackend::Sqlite => {
                let url = config.store.database_url.as_deref().unwrap_or_default();
                if let Some(parent) = sqlite_file_parent(url) {
                    std::fs::create_dir_all(parent)?;
                }
                Ok(Arc::new(SqliteDocumentStore::from_url(url).await?))
            }
            #[cfg(not(feature = "sqlite"))]
            StoreBackend::Sqlite => Err(ApplicationError::Core(egcontrol_core::config_error!(
                "This build does not include the sqlite backend",
                "application"
            ))),
        }
    }
}

/// Directory holding an `sqlite://` database file, if the URL names one
#[cfg(feature = "sqlite")]
fn sqlite_file_parent(url: &str) -> Option<&std::path::Path> {
    let path = url.strip_prefix("sqlite://")?;
    let path = path.split('?').next()?;
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
}

impl EgControlApplication {
    /// Create a new application from configuration
    pub async fn new(config: EgControlConfig) -> ApplicationResult<Self> {
        EgControlApplicationBuilder::new(config).build().await
    }

    /// Create a builder for more advanced configuration
    pub fn builder(config: EgControlConfig) -> EgControlApplicationBuilder {
        EgControlApplicationBuilder::new(config)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn records(&self) -> &RecordQueryService {
        &self.records
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &EgControlConfig {
        &self.config
    }

    /// Register an EG code as the signed-in user
    pub async fn register_eg(&self, code: &str) -> ApplicationResult<EgRecord> {
        let author = self.session.require_user().await?;
        self.records.create_eg(code, &author).await
    }

    /// Register an object and trip number as the signed-in user
    pub async fn register_object(&self, input: &NewObjectRecord) -> ApplicationResult<ObjectRecord> {
        let author = self.session.require_user().await?;
        self.records.create_object(input, &author).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egcontrol_core::not_found_error;

    #[test]
    fn test_user_message_hides_store_internals() {
        let error = ApplicationError::write(
            Collection::EgRecords,
            egcontrol_core::store_error!("disk I/O error at page 42", "sqlite_store"),
        );
        assert!(error.is_store_failure());
        assert_eq!(
            error.user_message(),
            "Could not save EG records. Please try again."
        );
        assert!(!error.user_message().contains("page 42"));
    }

    #[test]
    fn test_rejections_are_not_store_failures() {
        assert!(!ApplicationError::InvalidCredentials.is_store_failure());
        assert!(!ApplicationError::validation("code", "bad").is_store_failure());
        assert!(!ApplicationError::Core(not_found_error!("users/1", "test")).is_store_failure());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_file_parent() {
        assert_eq!(
            sqlite_file_parent("sqlite:///var/lib/egcontrol/egcontrol.db?mode=rwc"),
            Some(std::path::Path::new("/var/lib/egcontrol"))
        );
        assert_eq!(sqlite_file_parent("sqlite::memory:"), None);
        assert_eq!(sqlite_file_parent("sqlite://egcontrol.db"), None);
    }
}
