//! Session Manager - login, logout and restart-surviving sessions
//!
//! One manager holds at most one signed-in user. The identity is persisted as a
//! signed snapshot so the next process start can pick it up without asking for
//! the password again.

use super::storage::SessionStorage;
use super::token::SessionSigner;
use super::types::{PersistedSession, SessionState};
use crate::auth::{CredentialVerifier, PlainTextVerifier, UserIdentity};
use crate::users::UserDirectory;
use crate::{ApplicationError, ApplicationResult};
use egcontrol_core::{
    log_operation_error, log_operation_start, log_operation_success, DuplicateEmailPolicy,
    SessionConfig,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Owns the authenticated identity of one client
#[derive(Clone)]
pub struct SessionManager {
    /// Current state, shared by clones
    state: Arc<RwLock<SessionState>>,
    /// Bumped by every login and logout; a login commits only under its own ticket
    generation: Arc<AtomicU64>,
    directory: UserDirectory,
    storage: Arc<dyn SessionStorage>,
    signer: SessionSigner,
    verifier: Arc<dyn CredentialVerifier>,
    duplicate_email_policy: DuplicateEmailPolicy,
}

impl SessionManager {
    /// Create an unauthenticated manager; call [`restore`](Self::restore) to pick up a saved session
    pub fn new(
        directory: UserDirectory,
        storage: Arc<dyn SessionStorage>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::Unauthenticated)),
            generation: Arc::new(AtomicU64::new(0)),
            directory,
            storage,
            signer: SessionSigner::from_config(config),
            verifier: Arc::new(PlainTextVerifier),
            duplicate_email_policy: config.duplicate_email_policy,
        }
    }

    /// Replace the password comparison
    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Sign in with email and password
    ///
    /// Nothing is persisted unless every check passes. A failed login always
    /// leaves the manager unauthenticated, even if it was signed in before.
    /// A login that is dropped before it finishes, or overtaken by
    /// [`logout`](Self::logout), leaves no session behind.
    pub async fn login(&self, email: &str, password: &str) -> ApplicationResult<UserIdentity> {
        let mut attempt = self.begin_login().await?;

        log_operation_start!("login", email = email);

        let authenticated = self.authenticate(email, password).await;

        let mut state = self.state.write().await;
        if !attempt.is_current(&state) {
            attempt.settle();
            drop(state);
            let e = ApplicationError::session("Login was interrupted by a sign-out");
            log_operation_error!("login", e, email = email);
            return Err(e);
        }

        let result = match authenticated {
            Ok(identity) => self.persist(&identity).await.map(|_| identity),
            Err(e) => Err(e),
        };
        attempt.settle();

        match result {
            Ok(identity) => {
                *state = SessionState::Authenticated(identity.clone());
                drop(state);
                log_operation_success!("login", user_id = %identity.id, role = %identity.role);
                Ok(identity)
            }
            Err(e) => {
                *state = SessionState::Unauthenticated;
                drop(state);
                if attempt.was_authenticated {
                    self.clear_storage().await;
                }
                log_operation_error!("login", e, email = email);
                Err(e)
            }
        }
    }

    async fn begin_login(&self) -> ApplicationResult<LoginAttempt> {
        let mut state = self.state.write().await;
        if matches!(*state, SessionState::Authenticating) {
            return Err(ApplicationError::session("A login is already in progress"));
        }
        let was_authenticated = state.is_authenticated();
        *state = SessionState::Authenticating;
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(LoginAttempt {
            state: self.state.clone(),
            generation: self.generation.clone(),
            storage: self.storage.clone(),
            ticket,
            was_authenticated,
            settled: false,
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> ApplicationResult<UserIdentity> {
        let mut candidates = self.directory.find_credentials(email).await?;

        let candidate = match candidates.len() {
            0 => return Err(ApplicationError::not_found("Email not registered")),
            1 => candidates.remove(0),
            count => match self.duplicate_email_policy {
                DuplicateEmailPolicy::Reject => {
                    return Err(ApplicationError::AmbiguousAccount {
                        email: email.to_string(),
                        count,
                    })
                }
                DuplicateEmailPolicy::FirstMatch => {
                    warn!("{} accounts share {}, using the first one", count, email);
                    candidates.remove(0)
                }
            },
        };

        let Some(stored_password) = candidate.password.as_deref() else {
            debug!("User {} has no stored password", candidate.profile.id);
            return Err(ApplicationError::InvalidCredentials);
        };
        if password.trim().is_empty() {
            return Err(ApplicationError::InvalidCredentials);
        }

        if !self.verifier.verify(stored_password, password) {
            return Err(ApplicationError::InvalidCredentials);
        }

        Ok(candidate.profile.identity())
    }

    async fn persist(&self, identity: &UserIdentity) -> ApplicationResult<()> {
        let token = self.signer.sign(identity)?;
        self.storage.save(&PersistedSession::new(token)).await
    }

    async fn clear_storage(&self) {
        if let Err(e) = self.storage.clear().await {
            warn!("Failed to clear persisted session: {}", e);
        }
    }

    /// Sign out; never fails and is safe to repeat
    pub async fn logout(&self) {
        let previous = {
            let mut state = self.state.write().await;
            self.generation.fetch_add(1, Ordering::SeqCst);
            std::mem::take(&mut *state)
        };
        self.clear_storage().await;

        if let Some(user) = previous.user() {
            info!("User {} signed out", user.id);
        }
    }

    /// Pick up the persisted session, if a valid one exists
    ///
    /// The stored identity is trusted without re-checking the password. A
    /// snapshot that cannot be read, has a bad signature or has expired is
    /// removed and the manager stays unauthenticated.
    pub async fn restore(&self) -> Option<UserIdentity> {
        let persisted = match self.storage.load().await {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return None,
            Err(e) => {
                warn!("Discarding unreadable session snapshot: {}", e);
                self.clear_storage().await;
                return None;
            }
        };

        match self.signer.verify(&persisted.token) {
            Ok(identity) => {
                *self.state.write().await = SessionState::Authenticated(identity.clone());
                debug!("Restored session for user {}", identity.id);
                Some(identity)
            }
            Err(e) => {
                warn!("Discarding session snapshot: {}", e);
                self.clear_storage().await;
                None
            }
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn current_user(&self) -> Option<UserIdentity> {
        self.state.read().await.user().cloned()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated()
    }

    /// Role check against the cached identity
    pub async fn is_admin(&self) -> bool {
        self.state
            .read()
            .await
            .user()
            .is_some_and(UserIdentity::is_admin)
    }

    /// The signed-in user, or `Unauthorized`
    pub async fn require_user(&self) -> ApplicationResult<UserIdentity> {
        self.current_user()
            .await
            .ok_or_else(|| ApplicationError::unauthorized("No user is signed in"))
    }

    /// Re-read the signed-in user from the store and require the admin role
    ///
    /// The cached identity is replaced with the stored values, so a demoted
    /// account also stops passing [`is_admin`](Self::is_admin). An account
    /// that no longer exists is signed out.
    pub async fn authorize_admin(&self) -> ApplicationResult<UserIdentity> {
        let cached = self.require_user().await?;

        let Some(profile) = self.directory.get_user(&cached.id).await? else {
            warn!("Signed-in user {} no longer exists", cached.id);
            self.logout().await;
            return Err(ApplicationError::unauthorized("Account no longer exists"));
        };

        let current = profile.identity();
        if current != cached {
            debug!("Refreshing cached identity for user {}", current.id);
            {
                let mut state = self.state.write().await;
                if state.user().is_some_and(|u| u.id == current.id) {
                    *state = SessionState::Authenticated(current.clone());
                }
            }
            if let Err(e) = self.persist(&current).await {
                warn!("Failed to persist refreshed session: {}", e);
            }
        }

        if !current.is_admin() {
            return Err(ApplicationError::unauthorized(
                "Administrator role required",
            ));
        }

        Ok(current)
    }
}

/// An in-flight login; dropping it unsettled hands the state back
struct LoginAttempt {
    state: Arc<RwLock<SessionState>>,
    generation: Arc<AtomicU64>,
    storage: Arc<dyn SessionStorage>,
    ticket: u64,
    was_authenticated: bool,
    settled: bool,
}

impl LoginAttempt {
    fn is_current(&self, state: &SessionState) -> bool {
        is_pending(state, &self.generation, self.ticket)
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

fn is_pending(state: &SessionState, generation: &AtomicU64, ticket: u64) -> bool {
    generation.load(Ordering::SeqCst) == ticket && matches!(state, SessionState::Authenticating)
}

impl Drop for LoginAttempt {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut released = false;
        if let Ok(mut state) = self.state.try_write() {
            if is_pending(&state, &self.generation, self.ticket) {
                *state = SessionState::Unauthenticated;
                released = true;
            }
        }
        debug!("Abandoned login attempt {}", self.ticket);
        if released && !self.was_authenticated {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = self.state.clone();
        let generation = self.generation.clone();
        let storage = self.storage.clone();
        let ticket = self.ticket;
        let was_authenticated = self.was_authenticated;
        handle.spawn(async move {
            let mut state = state.write().await;
            if !released {
                if !is_pending(&state, &generation, ticket) {
                    return;
                }
                *state = SessionState::Unauthenticated;
            } else if generation.load(Ordering::SeqCst) != ticket {
                return;
            }
            // The previous user's snapshot must not outlive the replaced session
            if was_authenticated {
                if let Err(e) = storage.clear().await {
                    warn!("Failed to clear persisted session: {}", e);
                }
            }
        });
    }
}
