//! Reqwest-backed implementation of the API traits.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use biosync_core::model::{Credentials, Goal, GoalDraft, GoalId, GoalStatus, Registration};

use crate::api::{AuthApi, AuthResponse, AuthToken, GoalsApi};
use crate::error::{ApiError, error_for_status};

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Transport configuration for [`HttpApi`].
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ApiConfig {
    /// Read configuration from `BIOSYNC_API_URL` and
    /// `BIOSYNC_API_TIMEOUT_SECS`, falling back to local defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("BIOSYNC_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let timeout = env::var("BIOSYNC_API_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);
        Self { base_url, timeout }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// HTTP resource client.
///
/// Attaches the `Authorization` header only when a credential is supplied and
/// never caches responses. Timeouts surface as `ApiError::Network`.
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the underlying client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str, token: Option<&AuthToken>) -> RequestBuilder {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Token {}", token.as_str()));
        }
        builder
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn read_empty(response: Response) -> Result<(), ApiError> {
        // 204 and other empty-body successes are explicit void results.
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status.as_u16(), &body))
    }
}

/// Outgoing shape for goal updates: the record minus its read-only fields
/// (id, user, timestamps, derived percentage).
#[derive(Debug, Serialize)]
struct GoalPayload<'a> {
    title: &'a str,
    description: Option<&'a str>,
    start_date: NaiveDate,
    target_date: Option<NaiveDate>,
    target_value: f64,
    target_unit: &'a str,
    current_value: f64,
    status: GoalStatus,
    goal_type: &'a str,
}

impl<'a> From<&'a Goal> for GoalPayload<'a> {
    fn from(goal: &'a Goal) -> Self {
        Self {
            title: &goal.title,
            description: goal.description.as_deref(),
            start_date: goal.start_date,
            target_date: goal.target_date,
            target_value: goal.target_value,
            target_unit: &goal.target_unit,
            current_value: goal.current_value,
            status: goal.status,
            goal_type: &goal.goal_type,
        }
    }
}

#[async_trait]
impl GoalsApi for HttpApi {
    async fn list_goals(&self, token: Option<&AuthToken>) -> Result<Vec<Goal>, ApiError> {
        let response = self.request(Method::GET, "/goals/", token).send().await?;
        Self::read_json(response).await
    }

    async fn create_goal(
        &self,
        token: Option<&AuthToken>,
        draft: &GoalDraft,
    ) -> Result<Goal, ApiError> {
        let response = self
            .request(Method::POST, "/goals/", token)
            .json(draft)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn update_goal(&self, token: Option<&AuthToken>, goal: &Goal) -> Result<Goal, ApiError> {
        let response = self
            .request(Method::PUT, &format!("/goals/{}/", goal.id), token)
            .json(&GoalPayload::from(goal))
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn delete_goal(&self, token: Option<&AuthToken>, id: GoalId) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &format!("/goals/{id}/"), token)
            .send()
            .await?;
        Self::read_empty(response).await
    }
}

#[async_trait]
impl AuthApi for HttpApi {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let response = self
            .request(Method::POST, "/users/login/", None)
            .json(credentials)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let response = self
            .request(Method::POST, "/users/register/", None)
            .json(registration)
            .send()
            .await?;
        Self::read_json(response).await
    }
}
