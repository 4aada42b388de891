//! Session Storage - Persistence layer for the signed-in user
//!
//! Holds a single slot, the `current_user` snapshot, that survives restarts.

use super::types::PersistedSession;
use crate::ApplicationResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// File name of the persisted snapshot inside the storage directory
pub const SESSION_FILE_NAME: &str = "current_user.json";

/// Durable key-value slot for the current session
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Read the snapshot; `Ok(None)` when nothing is stored
    async fn load(&self) -> ApplicationResult<Option<PersistedSession>>;

    async fn save(&self, session: &PersistedSession) -> ApplicationResult<()>;

    /// Remove the snapshot; clearing an empty slot succeeds
    async fn clear(&self) -> ApplicationResult<()>;
}

/// Session storage backed by a JSON file
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    /// The directory is created on first save
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> Self {
        Self {
            path: storage_dir.as_ref().join(SESSION_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load(&self) -> ApplicationResult<Option<PersistedSession>> {
        let json_data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session: PersistedSession = serde_json::from_str(&json_data)?;
        debug!("Loaded session snapshot from {}", self.path.display());
        Ok(Some(session))
    }

    async fn save(&self, session: &PersistedSession) -> ApplicationResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json_data = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&self.path, json_data).await?;

        debug!("Saved session snapshot to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> ApplicationResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed session snapshot {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Session storage kept in memory
///
/// Clones share the slot, so a clone handed to a second manager behaves like
/// the same device after a restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    slot: Arc<RwLock<Option<PersistedSession>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of the slot
    pub async fn snapshot(&self) -> Option<PersistedSession> {
        self.slot.read().await.clone()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn load(&self) -> ApplicationResult<Option<PersistedSession>> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, session: &PersistedSession) -> ApplicationResult<()> {
        *self.slot.write().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> ApplicationResult<()> {
        *self.slot.write().await = None;
        Ok(())
    }
}
