#![forbid(unsafe_code)]

pub mod app_services;
pub mod credential_store;
pub mod error;
pub mod goal_store;
pub mod intent;
pub mod session_service;

pub use app_services::AppServices;
pub use credential_store::{
    CredentialStore, CredentialStoreError, InMemoryCredentialStore, JsonFileCredentialStore,
};
pub use error::{GoalStoreError, SessionError};
pub use goal_store::{AuthMode, GoalStore};
pub use intent::{GoalIntent, IntentOutcome};
pub use session_service::{Session, SessionService};
