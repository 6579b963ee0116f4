//! Optimistic goal state store with server reconciliation.
//!
//! The store is the sole mutable owner of the in-memory goal collection.
//! Mutations apply locally first, are marked in flight, and are reconciled
//! with the server's authoritative response; on failure the optimistic value
//! is discarded by refetching the whole collection.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use biosync_core::model::{Goal, GoalDraft, GoalId, GoalStats, GoalStatus};
use client::{ApiError, AuthToken, GoalsApi};

use crate::error::GoalStoreError;
use crate::session_service::SessionService;

/// Deployment mode: whether goal calls carry a session credential.
///
/// Collapses the source app's separate no-auth and token-auth drafts into one
/// code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Calls carry no credential; the remote store is unscoped.
    Anonymous,
    /// Calls require the active session's token.
    Token,
}

/// In-memory collection of the current session's goals.
pub struct GoalStore {
    api: Arc<dyn GoalsApi>,
    session: Arc<SessionService>,
    auth_mode: AuthMode,
    goals: Mutex<Vec<Goal>>,
    in_flight: Mutex<HashSet<GoalId>>,
    last_error: Mutex<Option<String>>,
}

/// Releases the per-goal mutation lock when the mutation resolves, on both
/// success and failure paths.
struct MutationGuard<'a> {
    store: &'a GoalStore,
    id: GoalId,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.store.lock_in_flight().remove(&self.id);
    }
}

impl GoalStore {
    #[must_use]
    pub fn new(api: Arc<dyn GoalsApi>, session: Arc<SessionService>, auth_mode: AuthMode) -> Self {
        Self {
            api,
            session,
            auth_mode,
            goals: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
            last_error: Mutex::new(None),
        }
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────
    //

    /// Copy of the current collection, in display order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Goal> {
        self.lock_goals().clone()
    }

    /// Aggregate statistics over the current collection.
    #[must_use]
    pub fn stats(&self) -> GoalStats {
        GoalStats::from_goals(&self.lock_goals())
    }

    /// Most recent user-facing failure message, for display.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock_last_error().clone()
    }

    /// Whether a mutation for this goal has not resolved yet.
    #[must_use]
    pub fn is_in_flight(&self, id: GoalId) -> bool {
        self.lock_in_flight().contains(&id)
    }

    /// Drop all local state. Called on logout alongside session teardown.
    pub fn clear(&self) {
        self.lock_goals().clear();
        *self.lock_last_error() = None;
    }

    //
    // ─── OPERATIONS ────────────────────────────────────────────────────────
    //

    /// Replace the whole collection with the server's current one.
    ///
    /// No-op without a credential in token mode. Idempotent: repeated calls
    /// with no intervening mutation yield the same collection.
    ///
    /// # Errors
    ///
    /// Returns `GoalStoreError::Api` on any resource client failure.
    pub async fn refresh(&self) -> Result<(), GoalStoreError> {
        let token = match self.auth_mode {
            AuthMode::Anonymous => None,
            AuthMode::Token => match self.session.token() {
                Some(token) => Some(token),
                None => return Ok(()),
            },
        };

        let generation = self.session.generation();
        match self.api.list_goals(token.as_ref()).await {
            Ok(goals) => {
                if self.session.generation() == generation {
                    debug!(count = goals.len(), "collection refreshed");
                    *self.lock_goals() = goals;
                }
                Ok(())
            }
            Err(err) => Err(self.note_api_failure(err)),
        }
    }

    /// Create a goal from a draft and prepend the server-confirmed record.
    ///
    /// Local validation runs before any network call. On failure the
    /// collection is left untouched and the draft is not retained.
    ///
    /// # Errors
    ///
    /// Returns `GoalStoreError::Validation` for a locally rejected draft,
    /// `GoalStoreError::NoSession` without a credential in token mode, or
    /// `GoalStoreError::Api` on a remote failure.
    pub async fn create(&self, draft: &GoalDraft) -> Result<Goal, GoalStoreError> {
        if let Err(err) = draft.validate() {
            return Err(self.remember(GoalStoreError::Validation(err)));
        }
        let token = self.credential()?;

        let generation = self.session.generation();
        match self.api.create_goal(token.as_ref(), draft).await {
            Ok(goal) => {
                if self.session.generation() != generation {
                    return Err(GoalStoreError::StaleSession);
                }
                self.lock_goals().insert(0, goal.clone());
                Ok(goal)
            }
            Err(err) => Err(self.note_api_failure(err)),
        }
    }

    /// Apply a signed delta to a goal's current value.
    ///
    /// The new value clamps to `[0, target]` and the status is re-derived by
    /// policy. Applied optimistically, then reconciled with the server's
    /// response; any failure rolls the collection back via `refresh()`.
    ///
    /// # Errors
    ///
    /// Returns `GoalStoreError::NotFound` if the id is absent locally (no
    /// network call is made), `GoalStoreError::MutationInFlight` if another
    /// mutation on the same id is unresolved, or the surfaced remote error.
    pub async fn apply_delta(&self, id: GoalId, delta: f64) -> Result<Goal, GoalStoreError> {
        self.reconcile_update(id, |goal| goal.with_delta(delta))
            .await
    }

    /// Mark a goal in progress without changing its value.
    ///
    /// A completed goal is left as is.
    ///
    /// # Errors
    ///
    /// Same contract as [`GoalStore::apply_delta`].
    pub async fn start(&self, id: GoalId) -> Result<Goal, GoalStoreError> {
        self.reconcile_update(id, |goal| {
            if goal.is_complete() {
                goal.clone()
            } else {
                goal.with_status(GoalStatus::InProgress)
            }
        })
        .await
    }

    /// Snap a goal to its target: current value becomes the target and the
    /// status derives to completed.
    ///
    /// # Errors
    ///
    /// Same contract as [`GoalStore::apply_delta`].
    pub async fn complete(&self, id: GoalId) -> Result<Goal, GoalStoreError> {
        self.reconcile_update(id, |goal| {
            goal.with_delta(goal.target_value - goal.current_value)
        })
        .await
    }

    /// Delete a goal remotely, removing it locally only on success.
    ///
    /// Callers must confirm the deletion with the user first. On failure the
    /// collection is left unchanged; no refetch.
    ///
    /// # Errors
    ///
    /// Returns `GoalStoreError::NotFound` if the id is absent locally,
    /// `GoalStoreError::MutationInFlight` for an unresolved mutation on the
    /// same id, or the surfaced remote error.
    pub async fn remove(&self, id: GoalId) -> Result<(), GoalStoreError> {
        let token = self.credential()?;
        let _guard = self.begin_mutation(id)?;
        if !self.lock_goals().iter().any(|g| g.id == id) {
            return Err(self.remember(GoalStoreError::NotFound(id)));
        }

        let generation = self.session.generation();
        match self.api.delete_goal(token.as_ref(), id).await {
            Ok(()) => {
                if self.session.generation() != generation {
                    return Err(GoalStoreError::StaleSession);
                }
                self.lock_goals().retain(|g| g.id != id);
                Ok(())
            }
            Err(err) => Err(self.note_api_failure(err)),
        }
    }

    //
    // ─── RECONCILIATION ────────────────────────────────────────────────────
    //

    /// Core optimistic-update path shared by all record mutations.
    ///
    /// Idle → InFlight → Idle: the record is replaced locally, the full
    /// record is sent as a replace-style update, and the server's response
    /// overwrites the optimistic value. On failure the optimistic value is
    /// discarded by refetching, then the error is surfaced.
    ///
    /// A completion that outlives its session is dropped without touching
    /// `last_error`: the caller gets `StaleSession`, but it is not a failure
    /// the next session should display.
    async fn reconcile_update(
        &self,
        id: GoalId,
        transform: impl FnOnce(&Goal) -> Goal,
    ) -> Result<Goal, GoalStoreError> {
        let token = self.credential()?;
        let _guard = self.begin_mutation(id)?;

        let optimistic = {
            let mut goals = self.lock_goals();
            let Some(slot) = goals.iter_mut().find(|g| g.id == id) else {
                drop(goals);
                return Err(self.remember(GoalStoreError::NotFound(id)));
            };
            let updated = transform(slot);
            *slot = updated.clone();
            updated
        };

        let generation = self.session.generation();
        match self.api.update_goal(token.as_ref(), &optimistic).await {
            Ok(server) => {
                if self.session.generation() != generation {
                    // Session ended while the request was out; do not commit
                    // the result against the new session's collection.
                    return Err(GoalStoreError::StaleSession);
                }
                let mut goals = self.lock_goals();
                if let Some(slot) = goals.iter_mut().find(|g| g.id == id) {
                    *slot = server.clone();
                }
                Ok(server)
            }
            Err(err) => {
                let err = self.note_api_failure(err);
                // Roll back the optimistic record by resynchronizing. After
                // an unauthorized teardown this is a no-op.
                if let Err(refresh_err) = self.refresh().await {
                    warn!(error = %refresh_err, "rollback refresh failed");
                }
                Err(err)
            }
        }
    }

    /// Credential for a mutation; mutations are rejected without a session
    /// in token mode.
    fn credential(&self) -> Result<Option<AuthToken>, GoalStoreError> {
        match self.auth_mode {
            AuthMode::Anonymous => Ok(None),
            AuthMode::Token => match self.session.token() {
                Some(token) => Ok(Some(token)),
                None => Err(self.remember(GoalStoreError::NoSession)),
            },
        }
    }

    /// Claim the per-goal mutation lock; at most one mutation per id.
    fn begin_mutation(&self, id: GoalId) -> Result<MutationGuard<'_>, GoalStoreError> {
        if !self.lock_in_flight().insert(id) {
            return Err(self.remember(GoalStoreError::MutationInFlight(id)));
        }
        Ok(MutationGuard { store: self, id })
    }

    /// Record a remote failure and, for a rejected credential, tear the
    /// session down and drop the collection.
    fn note_api_failure(&self, err: ApiError) -> GoalStoreError {
        if err.is_unauthorized() {
            self.session.invalidate();
            self.lock_goals().clear();
        }
        self.remember(GoalStoreError::Api(err))
    }

    /// Keep the most recent failure message visible to the view layer.
    fn remember(&self, err: GoalStoreError) -> GoalStoreError {
        *self.lock_last_error() = Some(err.to_string());
        err
    }

    fn lock_goals(&self) -> MutexGuard<'_, Vec<Goal>> {
        self.goals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<GoalId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_last_error(&self) -> MutexGuard<'_, Option<String>> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_store::InMemoryCredentialStore;
    use biosync_core::time::{fixed_clock, fixed_now};
    use client::InMemoryApi;

    fn build_draft(title: &str, target: f64) -> GoalDraft {
        GoalDraft {
            title: title.to_string(),
            description: None,
            start_date: fixed_now().date_naive(),
            target_date: None,
            target_value: target,
            target_unit: "Mins".to_string(),
            goal_type: "Health".to_string(),
        }
    }

    fn build_anonymous() -> (Arc<InMemoryApi>, GoalStore) {
        let api = Arc::new(InMemoryApi::anonymous(fixed_clock()));
        let session = Arc::new(SessionService::new(
            api.clone(),
            Arc::new(InMemoryCredentialStore::new()),
        ));
        let store = GoalStore::new(api.clone(), session, AuthMode::Anonymous);
        (api, store)
    }

    async fn seed_goal(api: &InMemoryApi, store: &GoalStore, target: f64) -> Goal {
        let goal = api
            .create_goal(None, &build_draft("Meditate", target))
            .await
            .unwrap();
        store.refresh().await.unwrap();
        goal
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let (api, store) = build_anonymous();
        seed_goal(&api, &store, 60.0).await;

        let first = store.snapshot();
        store.refresh().await.unwrap();
        assert_eq!(store.snapshot(), first);
    }

    #[tokio::test]
    async fn refresh_without_session_is_a_no_op() {
        let api = Arc::new(InMemoryApi::new(fixed_clock()));
        let session = Arc::new(SessionService::new(
            api.clone(),
            Arc::new(InMemoryCredentialStore::new()),
        ));
        let store = GoalStore::new(api.clone(), session, AuthMode::Token);

        // No credential: no call is made, so even a queued failure stays put.
        api.fail_next_with(ApiError::Server {
            status: 500,
            message: None,
        });
        store.refresh().await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn create_prepends_server_confirmed_record() {
        let (api, store) = build_anonymous();
        seed_goal(&api, &store, 60.0).await;

        let created = store.create(&build_draft("Read", 12.0)).await.unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], created);
    }

    #[tokio::test]
    async fn create_rejects_bad_target_before_any_network_call() {
        let (api, store) = build_anonymous();
        // Would fail the call if it went out; local validation short-circuits.
        api.fail_next_with(ApiError::Server {
            status: 500,
            message: None,
        });

        let err = store.create(&build_draft("Read", 0.0)).await.unwrap_err();
        assert!(matches!(err, GoalStoreError::Validation(_)));
        assert!(store.snapshot().is_empty());
        assert!(store.last_error().is_some());
        // The queued failure was never consumed.
        assert!(api.list_goals(None).await.is_err());
    }

    #[tokio::test]
    async fn delta_commits_server_authoritative_record() {
        let (api, store) = build_anonymous();
        let goal = seed_goal(&api, &store, 60.0).await;

        store.apply_delta(goal.id, 45.0).await.unwrap();
        let updated = store.apply_delta(goal.id, 1.0).await.unwrap();
        assert_eq!(updated.current_value, 46.0);
        assert_eq!(updated.status, GoalStatus::InProgress);

        let completed = store.apply_delta(goal.id, 14.0).await.unwrap();
        assert_eq!(completed.current_value, 60.0);
        assert_eq!(completed.status, GoalStatus::Completed);

        // Clamped: no change past the target.
        let clamped = store.apply_delta(goal.id, 1.0).await.unwrap();
        assert_eq!(clamped.current_value, 60.0);
        assert_eq!(clamped.status, GoalStatus::Completed);

        // Server recomputed the percentage on the way back.
        assert!((clamped.progress_percentage - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failed_delta_rolls_back_and_surfaces_error() {
        let (api, store) = build_anonymous();
        let goal = seed_goal(&api, &store, 60.0).await;
        store.apply_delta(goal.id, 10.0).await.unwrap();

        api.fail_next_with(ApiError::Server {
            status: 500,
            message: Some("boom".to_string()),
        });
        let err = store.apply_delta(goal.id, 5.0).await.unwrap_err();
        assert!(matches!(err, GoalStoreError::Api(ApiError::Server { .. })));

        // Rollback refetched the pre-optimistic value.
        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].current_value, 10.0);
        // And the message is visible for display.
        assert_eq!(store.last_error(), Some("server error 500: boom".to_string()));
    }

    #[tokio::test]
    async fn delta_on_unknown_id_is_local_not_found() {
        let (api, store) = build_anonymous();
        seed_goal(&api, &store, 60.0).await;

        let err = store
            .apply_delta(GoalId::new(999), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, GoalStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn overlapping_mutations_on_one_id_are_rejected() {
        let (api, store) = build_anonymous();
        let goal = seed_goal(&api, &store, 60.0).await;

        // Simulate an unresolved mutation holding the per-id lock.
        assert!(store.lock_in_flight().insert(goal.id));
        let err = store.apply_delta(goal.id, 1.0).await.unwrap_err();
        assert!(matches!(err, GoalStoreError::MutationInFlight(_)));

        store.lock_in_flight().remove(&goal.id);
        assert!(store.apply_delta(goal.id, 1.0).await.is_ok());
    }

    #[tokio::test]
    async fn remove_on_missing_id_leaves_collection_unchanged() {
        let (api, store) = build_anonymous();
        seed_goal(&api, &store, 60.0).await;
        let before = store.snapshot();

        let err = store.remove(GoalId::new(999)).await.unwrap_err();
        assert!(matches!(err, GoalStoreError::NotFound(_)));
        assert_eq!(store.snapshot(), before);
        assert_eq!(api.goal_count(), 1);
    }

    #[tokio::test]
    async fn failed_remove_keeps_the_record() {
        let (api, store) = build_anonymous();
        let goal = seed_goal(&api, &store, 60.0).await;

        api.fail_next_with(ApiError::Server {
            status: 500,
            message: None,
        });
        assert!(store.remove(goal.id).await.is_err());
        assert_eq!(store.snapshot().len(), 1);

        store.remove(goal.id).await.unwrap();
        assert!(store.snapshot().is_empty());
        assert_eq!(api.goal_count(), 0);
    }

    #[tokio::test]
    async fn start_flips_status_without_touching_value() {
        let (api, store) = build_anonymous();
        let goal = seed_goal(&api, &store, 60.0).await;

        let started = store.start(goal.id).await.unwrap();
        assert_eq!(started.status, GoalStatus::InProgress);
        assert_eq!(started.current_value, 0.0);
    }

    #[tokio::test]
    async fn complete_snaps_to_target() {
        let (api, store) = build_anonymous();
        let goal = seed_goal(&api, &store, 60.0).await;

        let completed = store.complete(goal.id).await.unwrap();
        assert_eq!(completed.current_value, 60.0);
        assert_eq!(completed.status, GoalStatus::Completed);
    }

    #[tokio::test]
    async fn stats_track_the_collection() {
        let (api, store) = build_anonymous();
        assert_eq!(store.stats().mean_progress, 0.0);

        let goal = seed_goal(&api, &store, 60.0).await;
        store.apply_delta(goal.id, 30.0).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.in_progress, 1);
        assert!((stats.mean_progress - 50.0).abs() < f64::EPSILON);
    }
}
