//! Session Types

use crate::auth::{Role, UserIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authentication state of a [`SessionManager`](super::SessionManager)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    /// A login is waiting on the store
    Authenticating,
    Authenticated(UserIdentity),
}

impl SessionState {
    pub fn user(&self) -> Option<&UserIdentity> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// Claims carried by the signed session snapshot
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    /// Subject (user document id)
    pub sub: String,
    pub name: String,
    pub email: String,
    pub shift: String,
    pub role: Role,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(identity: &UserIdentity, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            shift: identity.shift.clone(),
            role: identity.role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    pub fn to_identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.sub.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            shift: self.shift.clone(),
            role: self.role,
        }
    }
}

/// What the session storage keeps between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedSession {
    /// Signed snapshot produced by [`SessionSigner`](super::SessionSigner)
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

impl PersistedSession {
    pub fn new(token: String) -> Self {
        Self {
            token,
            saved_at: Utc::now(),
        }
    }
}
