mod goal;
mod ids;
mod stats;
mod user;

pub use goal::{Goal, GoalDraft, GoalStatus, GoalValidationError, derive_status, progress_percent};
pub use ids::{GoalId, UserId};
pub use stats::GoalStats;
pub use user::{Credentials, Registration, User};
