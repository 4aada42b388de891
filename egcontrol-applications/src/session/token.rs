//! Signed session snapshots
//!
//! The persisted session is an HS256 token so an edited or stale file on disk
//! cannot grant a session.

use super::types::SessionClaims;
use crate::auth::UserIdentity;
use crate::{ApplicationError, ApplicationResult};
use chrono::{Duration, Utc};
use egcontrol_core::SessionConfig;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// Signs and verifies session snapshots
#[derive(Clone)]
pub struct SessionSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            &config.signing_secret,
            Duration::hours(i64::from(config.ttl_hours)),
        )
    }

    /// Produce a token for `identity` that expires after the configured ttl
    pub fn sign(&self, identity: &UserIdentity) -> ApplicationResult<String> {
        let now = Utc::now();
        let claims = SessionClaims::new(identity, now, now + self.ttl);

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApplicationError::session(format!("Failed to sign session: {}", e)))
    }

    /// Check signature and expiry, returning the identity the token carries
    pub fn verify(&self, token: &str) -> ApplicationResult<UserIdentity> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(|e| {
            debug!("Session token rejected: {}", e);
            ApplicationError::session(format!("Invalid session token: {}", e))
        })?;

        Ok(data.claims.to_identity())
    }
}
