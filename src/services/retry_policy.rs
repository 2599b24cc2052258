//! Retry and stall policy.
//!
//! Decides what a worker failure means for a task and which tasks have gone
//! quiet for too long. Decisions are pure; the scheduler applies them through
//! the ledger.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::{Task, TaskStatus, TaskTransition};

/// `hours` as a duration, capped at the largest span chrono can hold.
pub fn saturating_hours(hours: u64) -> Duration {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}

/// Result of `on_failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    /// Task returned to `pending` with `retry_count` incremented
    Retry,
    /// Retries exhausted, task is `failed`
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    stall_threshold: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl RetryPolicy {
    pub const fn new(stall_threshold: Duration) -> Self {
        Self { stall_threshold }
    }

    pub fn from_hours(hours: u64) -> Self {
        Self::new(saturating_hours(hours))
    }

    pub const fn stall_threshold(&self) -> Duration {
        self.stall_threshold
    }

    /// Transition for a failed attempt of `task` (which must be `in_progress`).
    pub fn on_failure(&self, task: &Task, error: &str) -> (TaskTransition, RetryOutcome) {
        if task.retry_count < task.max_retries {
            let transition = TaskTransition::from_observed(task, TaskStatus::Pending)
                .with_retry_count(task.retry_count + 1);
            (transition, RetryOutcome::Retry)
        } else {
            let transition =
                TaskTransition::from_observed(task, TaskStatus::Failed).with_error(error);
            (transition, RetryOutcome::Exhausted)
        }
    }

    /// Non-terminal tasks with no status change for longer than the threshold.
    pub fn stalled<'a>(&self, tasks: &'a [Task], now: DateTime<Utc>) -> Vec<&'a Task> {
        tasks
            .iter()
            .filter(|t| !t.is_terminal())
            .filter(|t| now - t.updated_at > self.stall_threshold)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn running_task(retry_count: u32, max_retries: u32) -> Task {
        let mut task = Task::new(Uuid::nil(), "t", "d").with_max_retries(max_retries);
        task.status = TaskStatus::InProgress;
        task.retry_count = retry_count;
        task
    }

    #[test]
    fn test_failure_under_budget_retries() {
        let policy = RetryPolicy::default();
        let (transition, outcome) = policy.on_failure(&running_task(1, 3), "boom");
        assert_eq!(outcome, RetryOutcome::Retry);
        assert_eq!(transition.status, TaskStatus::Pending);
        assert_eq!(transition.retry_count, 2);
        assert_eq!(transition.expected_retry_count, 1);
    }

    #[test]
    fn test_failure_at_budget_exhausts() {
        let policy = RetryPolicy::default();
        let (transition, outcome) = policy.on_failure(&running_task(3, 3), "boom");
        assert_eq!(outcome, RetryOutcome::Exhausted);
        assert_eq!(transition.status, TaskStatus::Failed);
        assert_eq!(transition.retry_count, 3);
        assert_eq!(transition.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_zero_budget_fails_immediately() {
        let policy = RetryPolicy::default();
        let (_, outcome) = policy.on_failure(&running_task(0, 0), "boom");
        assert_eq!(outcome, RetryOutcome::Exhausted);
    }

    #[test]
    fn test_oversized_threshold_saturates() {
        assert_eq!(saturating_hours(24), Duration::hours(24));
        assert_eq!(saturating_hours(u64::MAX), Duration::MAX);
        assert_eq!(saturating_hours(10_000_000_000_000), Duration::MAX);

        let policy = RetryPolicy::from_hours(u64::MAX);
        let mut old = running_task(0, 3);
        old.updated_at = Utc::now() - Duration::days(365 * 50);
        assert!(policy.stalled(&[old], Utc::now()).is_empty());
    }

    #[test]
    fn test_stalled_skips_terminal_and_fresh_tasks() {
        let policy = RetryPolicy::from_hours(24);
        let now = Utc::now();

        let mut stale = running_task(0, 3);
        stale.updated_at = now - Duration::hours(25);
        let mut fresh = running_task(0, 3);
        fresh.updated_at = now - Duration::hours(1);
        let mut done = running_task(0, 3);
        done.status = TaskStatus::Completed;
        done.updated_at = now - Duration::hours(48);

        let tasks = [stale.clone(), fresh, done];
        let stalled = policy.stalled(&tasks, now);
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].id, stale.id);
    }
}
