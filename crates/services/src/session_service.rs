//! Authentication state: login, registration, restore, and teardown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use biosync_core::model::{Credentials, Registration, User};
use client::{AuthApi, AuthResponse, AuthToken};

use crate::credential_store::CredentialStore;
use crate::error::SessionError;

/// The authenticated identity and credential for the current user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: AuthToken,
    pub user: User,
}

impl From<AuthResponse> for Session {
    fn from(response: AuthResponse) -> Self {
        Self {
            token: response.token,
            user: response.user,
        }
    }
}

/// Owns the current session and its persistence.
///
/// The service is injected into anything that makes authenticated calls;
/// there is no global credential. A generation counter, bumped on every
/// login/logout/teardown, lets in-flight request completions detect that the
/// session they started under is gone and discard their results.
pub struct SessionService {
    auth: Arc<dyn AuthApi>,
    store: Arc<dyn CredentialStore>,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
}

impl SessionService {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthApi>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            auth,
            store,
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Load a previously persisted session without validating it remotely.
    ///
    /// Validity is discovered lazily: the first authenticated call with a
    /// stale credential comes back `Unauthorized` and tears the session down.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Credentials` if the persisted state is
    /// unreadable.
    pub fn restore(&self) -> Result<Option<Session>, SessionError> {
        let restored = self.store.load()?;
        if let Some(session) = &restored {
            debug!(user = %session.user.username, "restored persisted session");
            self.install(session.clone());
        }
        Ok(restored)
    }

    /// Exchange credentials for a session and persist it.
    ///
    /// Persistence failures are logged but do not fail the login; the
    /// in-memory session is already live.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` with `ApiError::Unauthorized` for rejected
    /// credentials.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let session: Session = self.auth.login(credentials).await?.into();
        self.install(session.clone());
        self.persist(&session);
        Ok(session)
    }

    /// Create an account and start a session from the response.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` with `ApiError::Validation` carrying the
    /// server's field-level messages verbatim.
    pub async fn register(&self, registration: &Registration) -> Result<Session, SessionError> {
        let session: Session = self.auth.register(registration).await?.into();
        self.install(session.clone());
        self.persist(&session);
        Ok(session)
    }

    /// Clear the session unconditionally. Never fails: persistence errors
    /// are logged and the in-memory state is cleared regardless.
    pub fn logout(&self) {
        self.teardown();
        debug!("session cleared by logout");
    }

    /// Forced teardown after the server rejected the credential. Same effect
    /// as `logout`, but wired from reconciliation rather than a user action.
    pub fn invalidate(&self) {
        self.teardown();
        warn!("credential rejected by server; session torn down");
    }

    /// Currently active session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.lock().clone()
    }

    /// Credential for outbound calls; `None` once logged out.
    #[must_use]
    pub fn token(&self) -> Option<AuthToken> {
        self.lock().as_ref().map(|s| s.token.clone())
    }

    /// Monotonic counter identifying the current session epoch.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn install(&self, session: Session) {
        *self.lock() = Some(session);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn teardown(&self) {
        *self.lock() = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear persisted credential");
        }
    }

    fn persist(&self, session: &Session) {
        if let Err(err) = self.store.save(session) {
            warn!(error = %err, "failed to persist session");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
