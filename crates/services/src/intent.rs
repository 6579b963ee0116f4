//! View-layer contract: explicit intent objects instead of callbacks.
//!
//! The view never mutates records; it describes what the user asked for and
//! hands it to the store.

use biosync_core::model::{Goal, GoalDraft, GoalId};

use crate::error::GoalStoreError;
use crate::goal_store::GoalStore;

/// A user action dispatched from the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum GoalIntent {
    /// Reload the collection from the remote store.
    Refresh,
    /// Create a goal from form input.
    Create(GoalDraft),
    /// Mark a goal in progress.
    Start(GoalId),
    /// Increment or decrement a goal's current value.
    ApplyDelta { id: GoalId, delta: f64 },
    /// Snap a goal to its target.
    Complete(GoalId),
    /// Delete a goal. The view must have confirmed this with the user.
    Remove(GoalId),
}

/// What an intent resolved to, for view updates beyond the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Refreshed,
    Created(Goal),
    Updated(Goal),
    Removed(GoalId),
}

impl GoalStore {
    /// Execute a view intent against the store.
    ///
    /// # Errors
    ///
    /// Propagates the underlying operation's `GoalStoreError`; the store has
    /// already recorded the message for display.
    pub async fn dispatch(&self, intent: GoalIntent) -> Result<IntentOutcome, GoalStoreError> {
        match intent {
            GoalIntent::Refresh => {
                self.refresh().await?;
                Ok(IntentOutcome::Refreshed)
            }
            GoalIntent::Create(draft) => Ok(IntentOutcome::Created(self.create(&draft).await?)),
            GoalIntent::Start(id) => Ok(IntentOutcome::Updated(self.start(id).await?)),
            GoalIntent::ApplyDelta { id, delta } => {
                Ok(IntentOutcome::Updated(self.apply_delta(id, delta).await?))
            }
            GoalIntent::Complete(id) => Ok(IntentOutcome::Updated(self.complete(id).await?)),
            GoalIntent::Remove(id) => {
                self.remove(id).await?;
                Ok(IntentOutcome::Removed(id))
            }
        }
    }
}
