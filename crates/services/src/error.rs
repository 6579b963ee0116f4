//! Shared error types for the services crate.

use thiserror::Error;

use biosync_core::model::{GoalId, GoalValidationError};
use client::ApiError;

use crate::credential_store::CredentialStoreError;

/// Errors emitted by `SessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Credentials(#[from] CredentialStoreError),
}

/// Errors emitted by `GoalStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GoalStoreError {
    /// The referenced goal is absent from the local collection.
    #[error("goal {0} not found")]
    NotFound(GoalId),

    /// Another mutation for the same goal has not resolved yet.
    #[error("goal {0} already has a mutation in flight")]
    MutationInFlight(GoalId),

    /// A mutation was attempted with no active session in token mode.
    #[error("no active session")]
    NoSession,

    /// The session changed while the request was in flight; the stale result
    /// was discarded. Unlike other failures this is never recorded in the
    /// store's last-error surface: the session that asked is gone, and the
    /// new session has nothing to display.
    #[error("session changed while the request was in flight")]
    StaleSession,

    #[error(transparent)]
    Validation(#[from] GoalValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
