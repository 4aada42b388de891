//! Authentication and Authorization Module
//!
//! Identities carry a role; the role is the only authorization signal.
//! Password checks go through a pluggable [`CredentialVerifier`].

pub mod credentials;
pub mod identity;

pub use credentials::{CredentialVerifier, PlainTextVerifier};
pub use identity::{Role, UserIdentity};
