//! Persistence seam for the session credential and identity.
//!
//! The session outlives the process, but where it lives (browser storage in
//! the source app, a JSON file here) is an adapter concern behind a trait.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::session_service::Session;

/// Errors surfaced by credential store adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CredentialStoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("credential serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stores at most one session across process restarts.
pub trait CredentialStore: Send + Sync {
    /// Load the persisted session, if any.
    ///
    /// # Errors
    ///
    /// Returns `CredentialStoreError` if the store is unreadable or corrupt.
    fn load(&self) -> Result<Option<Session>, CredentialStoreError>;

    /// Persist the session, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `CredentialStoreError` if the session cannot be written.
    fn save(&self, session: &Session) -> Result<(), CredentialStoreError>;

    /// Drop the persisted session. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns `CredentialStoreError` on I/O failure.
    fn clear(&self) -> Result<(), CredentialStoreError>;
}

/// Volatile store for tests and ephemeral sessions.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    slot: Mutex<Option<Session>>,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Result<Option<Session>, CredentialStoreError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, session: &Session) -> Result<(), CredentialStoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// File-backed store: one JSON document at a fixed path.
pub struct JsonFileCredentialStore {
    path: PathBuf,
}

impl JsonFileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for JsonFileCredentialStore {
    fn load(&self) -> Result<Option<Session>, CredentialStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, session: &Session) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(session)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
