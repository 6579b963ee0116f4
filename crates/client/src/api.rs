//! Trait surface for the remote resource store, plus an in-memory fake.
//!
//! The services layer only ever talks to these traits, so tests and local
//! demos can swap the HTTP transport for [`InMemoryApi`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use biosync_core::Clock;
use biosync_core::model::{
    Credentials, Goal, GoalDraft, GoalId, GoalStatus, Registration, User, UserId,
};

use crate::error::ApiError;

//
// ─── TOKEN ─────────────────────────────────────────────────────────────────────
//

/// Opaque credential issued by the API on login/registration.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(<redacted>)")
    }
}

/// Body returned by the login and register endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: AuthToken,
    pub user: User,
}

//
// ─── TRAITS ────────────────────────────────────────────────────────────────────
//

/// CRUD surface over the goal collection.
///
/// Every method takes the credential explicitly; no client-side caching.
#[async_trait]
pub trait GoalsApi: Send + Sync {
    /// Fetch the caller's full goal collection.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure or a non-success response.
    async fn list_goals(&self, token: Option<&AuthToken>) -> Result<Vec<Goal>, ApiError>;

    /// Create a goal from a draft, returning the server-confirmed record.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for rejected input, or other `ApiError`
    /// kinds on failure.
    async fn create_goal(
        &self,
        token: Option<&AuthToken>,
        draft: &GoalDraft,
    ) -> Result<Goal, ApiError>;

    /// Full-replace update. The server stays authoritative for computed
    /// fields, so callers must adopt the returned record.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown id, or other `ApiError`
    /// kinds on failure.
    async fn update_goal(&self, token: Option<&AuthToken>, goal: &Goal) -> Result<Goal, ApiError>;

    /// Delete a goal. An empty success response decodes to `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown id, or other `ApiError`
    /// kinds on failure.
    async fn delete_goal(&self, token: Option<&AuthToken>, id: GoalId) -> Result<(), ApiError>;
}

/// Unauthenticated session endpoints.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token and identity.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` for rejected credentials.
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;

    /// Create an account. Field-level validation errors pass through verbatim.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for rejected input.
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError>;
}

//
// ─── IN-MEMORY FAKE ────────────────────────────────────────────────────────────
//

struct StoredUser {
    user: User,
    password: String,
}

#[derive(Default)]
struct Inner {
    users: Vec<StoredUser>,
    tokens: HashMap<String, UserId>,
    goals: Vec<Goal>,
    next_goal_id: u64,
    next_user_id: u64,
    next_token: u64,
    fail_next: Option<ApiError>,
}

/// Fake remote store backed by in-memory collections.
///
/// Mirrors the server contract closely enough for realistic tests: auth
/// enforcement, per-user goal scoping, server-side recompute of
/// `progress_percentage`/`updated_at`, and field-level validation. A single
/// queued failure can be injected to exercise error paths.
pub struct InMemoryApi {
    clock: Clock,
    require_auth: bool,
    inner: Mutex<Inner>,
}

impl InMemoryApi {
    /// Auth-enforcing fake: every goal call needs a valid token.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            require_auth: true,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// No-auth fake for the anonymous deployment mode: goal calls succeed
    /// without a credential and see a single shared collection.
    #[must_use]
    pub fn anonymous(clock: Clock) -> Self {
        Self {
            clock,
            require_auth: false,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Queue an error to be returned by the next call, whatever it is.
    pub fn fail_next_with(&self, error: ApiError) {
        self.lock().fail_next = Some(error);
    }

    /// Invalidate a previously issued token, as a server-side expiry would.
    pub fn revoke_token(&self, token: &AuthToken) {
        self.lock().tokens.remove(token.as_str());
    }

    /// Number of goals currently stored, across all users.
    #[must_use]
    pub fn goal_count(&self) -> usize {
        self.lock().goals.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authorize(&self, inner: &Inner, token: Option<&AuthToken>) -> Result<UserId, ApiError> {
        if !self.require_auth {
            return Ok(UserId::new(0));
        }
        let token = token.ok_or(ApiError::Unauthorized)?;
        inner
            .tokens
            .get(token.as_str())
            .copied()
            .ok_or(ApiError::Unauthorized)
    }

    fn take_failure(inner: &mut Inner) -> Result<(), ApiError> {
        match inner.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn issue_token(inner: &mut Inner, user_id: UserId) -> AuthToken {
        inner.next_token += 1;
        let token = format!("token-{}", inner.next_token);
        inner.tokens.insert(token.clone(), user_id);
        AuthToken::new(token)
    }
}

#[async_trait]
impl GoalsApi for InMemoryApi {
    async fn list_goals(&self, token: Option<&AuthToken>) -> Result<Vec<Goal>, ApiError> {
        let mut inner = self.lock();
        Self::take_failure(&mut inner)?;
        let owner = self.authorize(&inner, token)?;
        Ok(inner
            .goals
            .iter()
            .filter(|g| !self.require_auth || g.owner == owner)
            .cloned()
            .collect())
    }

    async fn create_goal(
        &self,
        token: Option<&AuthToken>,
        draft: &GoalDraft,
    ) -> Result<Goal, ApiError> {
        let mut inner = self.lock();
        Self::take_failure(&mut inner)?;
        let owner = self.authorize(&inner, token)?;

        if !(draft.target_value > 0.0) {
            return Err(ApiError::Validation {
                field: Some("target_value".to_string()),
                message: "Ensure this value is greater than 0.".to_string(),
            });
        }
        let duplicate = inner
            .goals
            .iter()
            .any(|g| g.owner == owner && g.title == draft.title);
        if duplicate {
            // Mirrors the server's unique (user, title) constraint.
            return Err(ApiError::Validation {
                field: Some("title".to_string()),
                message: "goal with this title already exists".to_string(),
            });
        }

        inner.next_goal_id += 1;
        let now = self.clock.now();
        let goal = Goal {
            id: GoalId::new(inner.next_goal_id),
            owner,
            title: draft.title.clone(),
            description: draft.description.clone(),
            start_date: draft.start_date,
            target_date: draft.target_date,
            target_value: draft.target_value,
            target_unit: draft.target_unit.clone(),
            current_value: 0.0,
            status: GoalStatus::NotStarted,
            goal_type: draft.goal_type.clone(),
            created_at: now,
            updated_at: now,
            progress_percentage: 0.0,
        };
        inner.goals.push(goal.clone());
        Ok(goal)
    }

    async fn update_goal(&self, token: Option<&AuthToken>, goal: &Goal) -> Result<Goal, ApiError> {
        let mut inner = self.lock();
        Self::take_failure(&mut inner)?;
        let owner = self.authorize(&inner, token)?;
        let now = self.clock.now();
        let require_auth = self.require_auth;

        let stored = inner
            .goals
            .iter_mut()
            .find(|g| g.id == goal.id && (!require_auth || g.owner == owner))
            .ok_or(ApiError::NotFound)?;

        // Read-only fields (id, owner, created_at) keep their stored values;
        // everything else is a full replace, with computed fields re-derived.
        stored.title = goal.title.clone();
        stored.description = goal.description.clone();
        stored.start_date = goal.start_date;
        stored.target_date = goal.target_date;
        stored.target_value = goal.target_value;
        stored.target_unit = goal.target_unit.clone();
        stored.current_value = goal.current_value;
        stored.status = goal.status;
        stored.goal_type = goal.goal_type.clone();
        stored.updated_at = now;
        stored.progress_percentage = stored.progress_percent();

        Ok(stored.clone())
    }

    async fn delete_goal(&self, token: Option<&AuthToken>, id: GoalId) -> Result<(), ApiError> {
        let mut inner = self.lock();
        Self::take_failure(&mut inner)?;
        let owner = self.authorize(&inner, token)?;
        let require_auth = self.require_auth;

        let before = inner.goals.len();
        inner
            .goals
            .retain(|g| g.id != id || (require_auth && g.owner != owner));
        if inner.goals.len() == before {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthApi for InMemoryApi {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let mut inner = self.lock();
        Self::take_failure(&mut inner)?;

        let user = inner
            .users
            .iter()
            .find(|stored| {
                (stored.user.username == credentials.identifier
                    || stored.user.email == credentials.identifier)
                    && stored.password == credentials.password
            })
            .map(|stored| stored.user.clone())
            .ok_or(ApiError::Unauthorized)?;

        let token = Self::issue_token(&mut inner, user.id);
        Ok(AuthResponse { token, user })
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let mut inner = self.lock();
        Self::take_failure(&mut inner)?;

        if registration.password != registration.confirm_password {
            return Err(ApiError::Validation {
                field: Some("password".to_string()),
                message: "Password fields didn't match.".to_string(),
            });
        }
        if inner
            .users
            .iter()
            .any(|stored| stored.user.username == registration.username)
        {
            return Err(ApiError::Validation {
                field: Some("username".to_string()),
                message: "username already taken".to_string(),
            });
        }

        inner.next_user_id += 1;
        let user = User {
            id: UserId::new(inner.next_user_id),
            email: registration.email.clone(),
            username: registration.username.clone(),
        };
        inner.users.push(StoredUser {
            user: user.clone(),
            password: registration.password.clone(),
        });

        let token = Self::issue_token(&mut inner, user.id);
        Ok(AuthResponse { token, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biosync_core::time::fixed_clock;

    fn build_draft(title: &str) -> GoalDraft {
        GoalDraft {
            title: title.to_string(),
            description: None,
            start_date: biosync_core::time::fixed_now().date_naive(),
            target_date: None,
            target_value: 60.0,
            target_unit: "Mins".to_string(),
            goal_type: "Health".to_string(),
        }
    }

    async fn register_ada(api: &InMemoryApi) -> AuthResponse {
        api.register(&Registration {
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            password: "hunter22".to_string(),
            confirm_password: "hunter22".to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn goal_calls_without_token_are_unauthorized() {
        let api = InMemoryApi::new(fixed_clock());
        let err = api.list_goals(None).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn register_login_and_scope_goals_per_user() {
        let api = InMemoryApi::new(fixed_clock());
        let ada = register_ada(&api).await;

        let goal = api
            .create_goal(Some(&ada.token), &build_draft("Meditate"))
            .await
            .unwrap();
        assert_eq!(goal.owner, ada.user.id);
        assert_eq!(goal.status, GoalStatus::NotStarted);

        let grace = api
            .register(&Registration {
                email: "grace@example.com".to_string(),
                username: "grace".to_string(),
                password: "pw".to_string(),
                confirm_password: "pw".to_string(),
            })
            .await
            .unwrap();
        assert!(api.list_goals(Some(&grace.token)).await.unwrap().is_empty());

        let relogin = api
            .login(&Credentials {
                identifier: "ada@example.com".to_string(),
                password: "hunter22".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(api.list_goals(Some(&relogin.token)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_recomputes_server_owned_fields() {
        let api = InMemoryApi::new(fixed_clock());
        let ada = register_ada(&api).await;
        let goal = api
            .create_goal(Some(&ada.token), &build_draft("Run"))
            .await
            .unwrap();

        let mut edited = goal.with_delta(30.0);
        edited.progress_percentage = -1.0; // client value must not survive
        let updated = api.update_goal(Some(&ada.token), &edited).await.unwrap();
        assert_eq!(updated.current_value, 30.0);
        assert!((updated.progress_percentage - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn duplicate_username_passes_field_error_through() {
        let api = InMemoryApi::new(fixed_clock());
        register_ada(&api).await;
        let err = api
            .register(&Registration {
                email: "other@example.com".to_string(),
                username: "ada".to_string(),
                password: "pw".to_string(),
                confirm_password: "pw".to_string(),
            })
            .await
            .unwrap_err();
        match err {
            ApiError::Validation { field, message } => {
                assert_eq!(field.as_deref(), Some("username"));
                assert_eq!(message, "username already taken");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let api = InMemoryApi::anonymous(fixed_clock());
        api.fail_next_with(ApiError::Server {
            status: 500,
            message: None,
        });
        assert!(api.list_goals(None).await.is_err());
        assert!(api.list_goals(None).await.is_ok());
    }

    #[tokio::test]
    async fn anonymous_mode_skips_auth() {
        let api = InMemoryApi::anonymous(fixed_clock());
        let goal = api.create_goal(None, &build_draft("Walk")).await.unwrap();
        assert_eq!(api.list_goals(None).await.unwrap(), vec![goal]);
    }
}
