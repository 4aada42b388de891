//! User Directory - administrator user management
//!
//! Users are created and edited by administrators only and are never deleted.
//! Every profile write bumps a `revision` field and is conditional on the
//! revision the editor last saw.

use crate::auth::{Role, UserIdentity};
use crate::session::SessionManager;
use crate::{ApplicationError, ApplicationResult};
use egcontrol_core::{
    log_operation_start, log_operation_success, Collection, Document, DocumentQuery,
    DocumentStore, EgControlError, FieldFilter, Fields,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

const USERS: Collection = Collection::Users;

/// A user as shown to administrators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub shift: String,
    pub role: Role,
    /// Incremented on every update
    pub revision: i64,
}

impl UserProfile {
    pub fn from_document(doc: &Document) -> Self {
        let identity = UserIdentity::from_document(doc);
        Self {
            id: identity.id,
            name: identity.name,
            email: identity.email,
            shift: identity.shift,
            role: identity.role,
            revision: doc.i64_field("revision").unwrap_or(0),
        }
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            shift: self.shift.clone(),
            role: self.role,
        }
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub shift: String,
    pub role: Role,
    pub password: String,
}

/// Full-field profile update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    /// Revision the editor loaded; the update fails if the stored one differs
    pub expected_revision: i64,
    pub name: String,
    pub email: String,
    pub shift: String,
    pub role: Role,
    /// `None` or blank keeps the current password
    pub password: Option<String>,
}

/// A user document together with its stored password
#[derive(Debug, Clone)]
pub(crate) struct StoredUser {
    pub profile: UserProfile,
    pub password: Option<String>,
}

/// Reads and writes the `users` collection
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
}

fn required(field: &str, value: &str) -> ApplicationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApplicationError::validation(
            field,
            format!("{} is required", field),
        ));
    }
    Ok(trimmed.to_string())
}

fn profile_fields(name: String, email: String, shift: String, role: Role, revision: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::from(name));
    fields.insert("email".to_string(), Value::from(email));
    fields.insert("shift".to_string(), Value::from(shift));
    fields.insert("role".to_string(), Value::from(role.as_str()));
    fields.insert("revision".to_string(), Value::from(revision));
    fields
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn documents_with_email(&self, email: &str) -> ApplicationResult<Vec<Document>> {
        self.store
            .get_documents(
                USERS,
                DocumentQuery::all().filter(FieldFilter::eq("email", email)),
            )
            .await
            .map_err(|e| ApplicationError::read(USERS, e))
    }

    /// Users registered with exactly this email, in store order
    pub async fn find_by_email(&self, email: &str) -> ApplicationResult<Vec<UserProfile>> {
        let docs = self.documents_with_email(email).await?;
        Ok(docs.iter().map(UserProfile::from_document).collect())
    }

    /// Like [`find_by_email`](Self::find_by_email) but keeps the stored passwords
    pub(crate) async fn find_credentials(&self, email: &str) -> ApplicationResult<Vec<StoredUser>> {
        let docs = self.documents_with_email(email).await?;
        Ok(docs
            .iter()
            .map(|doc| StoredUser {
                profile: UserProfile::from_document(doc),
                password: doc.str_field("password").map(str::to_string),
            })
            .collect())
    }

    pub async fn get_user(&self, id: &str) -> ApplicationResult<Option<UserProfile>> {
        let doc = self
            .store
            .get_document(USERS, id)
            .await
            .map_err(|e| ApplicationError::read(USERS, e))?;
        Ok(doc.as_ref().map(UserProfile::from_document))
    }

    /// Number of registered users, fetched fresh on every call
    pub async fn count_users(&self) -> ApplicationResult<usize> {
        let docs = self
            .store
            .get_documents(USERS, DocumentQuery::all())
            .await
            .map_err(|e| ApplicationError::read(USERS, e))?;
        Ok(docs.len())
    }

    /// All users, for administrators
    pub async fn list_users(&self, session: &SessionManager) -> ApplicationResult<Vec<UserProfile>> {
        session.authorize_admin().await?;

        let docs = self
            .store
            .get_documents(USERS, DocumentQuery::all())
            .await
            .map_err(|e| ApplicationError::read(USERS, e))?;
        Ok(docs.iter().map(UserProfile::from_document).collect())
    }

    /// Create a user, for administrators
    pub async fn create_user(
        &self,
        session: &SessionManager,
        user: NewUser,
    ) -> ApplicationResult<UserProfile> {
        session.authorize_admin().await?;
        self.insert_user(user).await
    }

    /// Create the first administrator of an empty directory
    ///
    /// Fails with `Unauthorized` once any user exists.
    pub async fn bootstrap_admin(&self, mut user: NewUser) -> ApplicationResult<UserProfile> {
        if self.count_users().await? > 0 {
            return Err(ApplicationError::unauthorized(
                "Users already exist; sign in as an administrator",
            ));
        }
        user.role = Role::Admin;
        self.insert_user(user).await
    }

    async fn insert_user(&self, user: NewUser) -> ApplicationResult<UserProfile> {
        let name = required("name", &user.name)?;
        let email = required("email", &user.email)?;
        let shift = required("shift", &user.shift)?;
        if user.password.trim().is_empty() {
            return Err(ApplicationError::validation("password", "password is required"));
        }

        log_operation_start!("create_user", email = %email);

        if !self.documents_with_email(&email).await?.is_empty() {
            return Err(ApplicationError::conflict(format!(
                "A user with email {} already exists",
                email
            )));
        }

        let mut fields = profile_fields(name, email, shift, user.role, 0);
        fields.insert("password".to_string(), Value::from(user.password));

        let id = self
            .store
            .add_document(USERS, fields.clone())
            .await
            .map_err(|e| ApplicationError::write(USERS, e))?;

        let profile = UserProfile::from_document(&Document::new(id, fields));
        log_operation_success!("create_user", user_id = %profile.id, role = %profile.role);
        Ok(profile)
    }

    /// Replace a user's profile fields, for administrators
    pub async fn update_user(
        &self,
        session: &SessionManager,
        id: &str,
        update: UserUpdate,
    ) -> ApplicationResult<UserProfile> {
        session.authorize_admin().await?;

        let name = required("name", &update.name)?;
        let email = required("email", &update.email)?;
        let shift = required("shift", &update.shift)?;

        log_operation_start!("update_user", user_id = id);

        let collision = self
            .documents_with_email(&email)
            .await?
            .iter()
            .any(|doc| doc.id != id);
        if collision {
            return Err(ApplicationError::conflict(format!(
                "Another user already uses email {}",
                email
            )));
        }

        let mut fields = profile_fields(name, email, shift, update.role, update.expected_revision + 1);
        if let Some(password) = update.password.filter(|p| !p.trim().is_empty()) {
            fields.insert("password".to_string(), Value::from(password));
        } else {
            debug!("Keeping current password for user {}", id);
        }

        self.store
            .update_document(
                USERS,
                id,
                fields,
                Some(egcontrol_core::Precondition::field_equals(
                    "revision",
                    update.expected_revision,
                )),
            )
            .await
            .map_err(|e| match e {
                EgControlError::PreconditionFailed { .. } => ApplicationError::conflict(
                    "The user was modified by someone else; reload and try again",
                ),
                EgControlError::NotFound { .. } => {
                    ApplicationError::not_found(format!("User {} not found", id))
                }
                other => ApplicationError::write(USERS, other),
            })?;

        let profile = self
            .get_user(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("User {} not found", id)))?;

        info!("Updated user {} to revision {}", profile.id, profile.revision);
        log_operation_success!("update_user", user_id = id);
        Ok(profile)
    }
}
