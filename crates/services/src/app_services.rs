use std::sync::Arc;

use tracing::warn;

use client::{ApiConfig, ApiError, AuthApi, GoalsApi, HttpApi};

use crate::credential_store::CredentialStore;
use crate::error::GoalStoreError;
use crate::goal_store::{AuthMode, GoalStore};
use crate::session_service::SessionService;

/// Assembles the session service and goal store over one API transport.
#[derive(Clone)]
pub struct AppServices {
    session: Arc<SessionService>,
    goals: Arc<GoalStore>,
}

impl AppServices {
    /// Build services over the HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the HTTP client cannot be built.
    pub fn new_http(
        config: &ApiConfig,
        auth_mode: AuthMode,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ApiError> {
        let api = Arc::new(HttpApi::new(config)?);
        Ok(Self::with_api(api.clone(), api, auth_mode, credentials))
    }

    /// Build services over any transport, usually a fake in tests.
    #[must_use]
    pub fn with_api(
        goals_api: Arc<dyn GoalsApi>,
        auth_api: Arc<dyn AuthApi>,
        auth_mode: AuthMode,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let session = Arc::new(SessionService::new(auth_api, credentials));
        let goals = Arc::new(GoalStore::new(goals_api, Arc::clone(&session), auth_mode));
        Self { session, goals }
    }

    /// Process-start lifecycle: restore any persisted session, then load the
    /// collection. A corrupt persisted session is logged and skipped; the
    /// credential's validity is only discovered on the first call.
    ///
    /// # Errors
    ///
    /// Returns `GoalStoreError` if the initial refresh fails.
    pub async fn start(&self) -> Result<(), GoalStoreError> {
        if let Err(err) = self.session.restore() {
            warn!(error = %err, "could not restore persisted session");
        }
        self.goals.refresh().await
    }

    /// Explicit logout: clears the session and the goal collection together.
    pub fn logout(&self) {
        self.session.logout();
        self.goals.clear();
    }

    #[must_use]
    pub fn session(&self) -> Arc<SessionService> {
        Arc::clone(&self.session)
    }

    #[must_use]
    pub fn goals(&self) -> Arc<GoalStore> {
        Arc::clone(&self.goals)
    }
}
