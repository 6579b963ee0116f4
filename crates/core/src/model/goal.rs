use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{GoalId, UserId};

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle status of a goal, as stored by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    NotStarted,
    InProgress,
    Completed,
    Stuck,
}

/// Derive a status from numeric progress.
///
/// Policy: `current >= target` is `Completed`, anything strictly between is
/// `InProgress`, and a goal driven back to zero returns to `NotStarted`.
/// `Stuck` is never derived, only assigned explicitly by the user or server.
#[must_use]
pub fn derive_status(current: f64, target: f64) -> GoalStatus {
    if target > 0.0 && current >= target {
        GoalStatus::Completed
    } else if current > 0.0 {
        GoalStatus::InProgress
    } else {
        GoalStatus::NotStarted
    }
}

fn clamp_to_target(value: f64, target: f64) -> f64 {
    let ceiling = if target > 0.0 { target } else { 0.0 };
    value.max(0.0).min(ceiling)
}

//
// ─── GOAL ──────────────────────────────────────────────────────────────────────
//

/// A tracked goal, in the shape served by the remote store.
///
/// `id`, `owner`, the timestamps, and `progress_percentage` are assigned by
/// the server and stripped from outgoing update bodies by the resource client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    #[serde(rename = "user")]
    pub owner: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    pub target_value: f64,
    pub target_unit: String,
    pub current_value: f64,
    pub status: GoalStatus,
    pub goal_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress_percentage: f64,
}

impl Goal {
    /// Completion percentage, capped at 100 and guarded against a zero target.
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.current_value, self.target_value)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == GoalStatus::Completed
    }

    /// Apply a signed delta to the current value, clamping to `[0, target]`
    /// and re-deriving status by policy.
    ///
    /// The local completion percentage is recomputed for optimistic display;
    /// the server remains authoritative for it on reconciliation.
    #[must_use]
    pub fn with_delta(&self, delta: f64) -> Goal {
        let current = clamp_to_target(self.current_value + delta, self.target_value);
        let mut updated = self.clone();
        updated.current_value = current;
        updated.status = derive_status(current, self.target_value);
        updated.progress_percentage = updated.progress_percent();
        updated
    }

    /// Copy of this goal with an explicitly assigned status.
    #[must_use]
    pub fn with_status(&self, status: GoalStatus) -> Goal {
        let mut updated = self.clone();
        updated.status = status;
        updated
    }
}

/// Completion percentage for a raw value pair.
#[must_use]
pub fn progress_percent(current: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    ((current / target) * 100.0).min(100.0)
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// User-entered goal fields, validated locally before any network call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
    pub target_value: f64,
    pub target_unit: String,
    pub goal_type: String,
}

impl GoalDraft {
    /// Check the draft against local invariants.
    ///
    /// # Errors
    ///
    /// Returns `GoalValidationError` when the title or unit is blank or the
    /// target is not strictly positive.
    pub fn validate(&self) -> Result<(), GoalValidationError> {
        if self.title.trim().is_empty() {
            return Err(GoalValidationError::EmptyTitle);
        }
        if self.target_unit.trim().is_empty() {
            return Err(GoalValidationError::EmptyUnit);
        }
        if !(self.target_value > 0.0) {
            return Err(GoalValidationError::NonPositiveTarget {
                value: self.target_value,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum GoalValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("target unit must not be empty")]
    EmptyUnit,

    #[error("target value must be greater than zero, got {value}")]
    NonPositiveTarget { value: f64 },
}

impl GoalValidationError {
    /// Form field the error belongs to, for inline display.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            GoalValidationError::EmptyTitle => "title",
            GoalValidationError::EmptyUnit => "target_unit",
            GoalValidationError::NonPositiveTarget { .. } => "target_value",
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
