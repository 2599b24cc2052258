//! Goal status derivation.
//!
//! A goal's status is a function of its tasks. The tracker recomputes it
//! after task transitions and publishes a notification when it changes.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::event_bus::EventBus;
use crate::domain::errors::DomainResult;
use crate::domain::models::{Goal, GoalStatus, Task, TaskStatus};
use crate::domain::ports::{GoalRepository, TaskLedger};

/// Derive a goal status from its tasks.
///
/// Every task is required, so a single `failed` task lies on every path to
/// completion. `killed` tasks never make a goal `failed`; they leave it
/// `in_progress` for an operator to settle.
pub fn derive_goal_status(tasks: &[Task]) -> GoalStatus {
    if tasks.iter().all(|t| t.status == TaskStatus::Completed) {
        return GoalStatus::Completed;
    }
    if tasks.iter().any(|t| t.status == TaskStatus::Failed) {
        return GoalStatus::Failed;
    }
    let untouched = tasks
        .iter()
        .all(|t| matches!(t.status, TaskStatus::Pending) && t.retry_count == 0);
    if untouched {
        GoalStatus::Pending
    } else {
        GoalStatus::InProgress
    }
}

pub struct GoalTracker {
    goals: Arc<dyn GoalRepository>,
    ledger: Arc<dyn TaskLedger>,
    events: Arc<EventBus>,
}

impl GoalTracker {
    pub fn new(
        goals: Arc<dyn GoalRepository>,
        ledger: Arc<dyn TaskLedger>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            goals,
            ledger,
            events,
        }
    }

    pub async fn get(&self, goal_id: Uuid) -> DomainResult<Goal> {
        self.goals.get(goal_id).await
    }

    /// Recompute and persist the goal status.
    pub async fn refresh(&self, goal_id: Uuid) -> DomainResult<Goal> {
        let mut goal = self.goals.get(goal_id).await?;
        let tasks = self.ledger.list(goal_id).await?;
        let status = derive_goal_status(&tasks);

        if goal.set_status(status) {
            self.goals.update(&goal).await?;
            info!(goal_id = %goal.id, status = %goal.status, "goal status changed");
            self.events.goal_changed(&goal);
        }
        Ok(goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(statuses: &[TaskStatus]) -> Vec<Task> {
        statuses
            .iter()
            .map(|s| {
                let mut t = Task::new(Uuid::nil(), "t", "d");
                t.status = *s;
                t
            })
            .collect()
    }

    #[test]
    fn test_all_completed() {
        let t = tasks(&[TaskStatus::Completed, TaskStatus::Completed]);
        assert_eq!(derive_goal_status(&t), GoalStatus::Completed);
    }

    #[test]
    fn test_any_failed() {
        let t = tasks(&[TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Blocked]);
        assert_eq!(derive_goal_status(&t), GoalStatus::Failed);
    }

    #[test]
    fn test_killed_is_not_failure() {
        let t = tasks(&[TaskStatus::Completed, TaskStatus::Killed, TaskStatus::Blocked]);
        assert_eq!(derive_goal_status(&t), GoalStatus::InProgress);
    }

    #[test]
    fn test_untouched_goal_is_pending() {
        let t = tasks(&[TaskStatus::Pending, TaskStatus::Pending]);
        assert_eq!(derive_goal_status(&t), GoalStatus::Pending);

        let mut retried = tasks(&[TaskStatus::Pending]);
        retried[0].retry_count = 1;
        assert_eq!(derive_goal_status(&retried), GoalStatus::InProgress);
    }
}
