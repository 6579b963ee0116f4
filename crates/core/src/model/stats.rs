use crate::model::goal::{Goal, GoalStatus, progress_percent};

/// Aggregate view over a goal collection.
///
/// Pure derived data: recomputed from the full collection on demand, never
/// stored alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GoalStats {
    pub total: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub stuck: usize,
    /// Mean of per-goal completion percentages, capped at 100 each.
    /// Exactly 0.0 for an empty collection.
    pub mean_progress: f64,
}

impl GoalStats {
    #[must_use]
    pub fn from_goals(goals: &[Goal]) -> Self {
        let mut stats = GoalStats {
            total: goals.len(),
            ..GoalStats::default()
        };
        if goals.is_empty() {
            return stats;
        }

        let mut percent_sum = 0.0;
        for goal in goals {
            match goal.status {
                GoalStatus::NotStarted => stats.not_started += 1,
                GoalStatus::InProgress => stats.in_progress += 1,
                GoalStatus::Completed => stats.completed += 1,
                GoalStatus::Stuck => stats.stuck += 1,
            }
            percent_sum += progress_percent(goal.current_value, goal.target_value);
        }

        // Denominator is non-zero here; the empty case returned above.
        #[allow(clippy::cast_precision_loss)]
        let count = goals.len() as f64;
        stats.mean_progress = percent_sum / count;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::goal::derive_status;
    use crate::model::ids::{GoalId, UserId};
    use crate::time::fixed_now;

    fn build_goal(id: u64, current: f64, target: f64) -> Goal {
        let now = fixed_now();
        Goal {
            id: GoalId::new(id),
            owner: UserId::new(1),
            title: format!("Goal {id}"),
            description: None,
            start_date: now.date_naive(),
            target_date: None,
            target_value: target,
            target_unit: "Reps".to_string(),
            current_value: current,
            status: derive_status(current, target),
            goal_type: "Fitness".to_string(),
            created_at: now,
            updated_at: now,
            progress_percentage: progress_percent(current, target),
        }
    }

    #[test]
    fn empty_collection_yields_zero_mean() {
        let stats = GoalStats::from_goals(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.mean_progress, 0.0);
        assert!(stats.mean_progress.is_finite());
    }

    #[test]
    fn counts_by_status_and_averages_progress() {
        let goals = vec![
            build_goal(1, 0.0, 10.0),
            build_goal(2, 5.0, 10.0),
            build_goal(3, 10.0, 10.0),
        ];
        let stats = GoalStats::from_goals(&goals);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.not_started, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.completed, 1);
        assert!((stats.mean_progress - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_target_goal_contributes_zero_percent() {
        let goals = vec![build_goal(1, 5.0, 0.0), build_goal(2, 10.0, 10.0)];
        let stats = GoalStats::from_goals(&goals);
        assert!((stats.mean_progress - 50.0).abs() < f64::EPSILON);
    }
}
