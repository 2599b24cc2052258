//! Goal domain model.
//!
//! A goal is the top-level unit of work. It owns an ordered set of tasks
//! (creation order) and its status is derived from theirs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// No task has left `pending` yet
    Pending,
    /// Work has started
    InProgress,
    /// Every task completed
    Completed,
    /// Some task exhausted its retries
    Failed,
}

impl Default for GoalStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl GoalStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A goal decomposed into tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub description: String,
    pub status: GoalStatus,
    /// Task IDs in creation order, not execution order
    pub task_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: GoalStatus::default(),
            task_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Record a status change. Returns `false` when the status is unchanged.
    pub fn set_status(&mut self, status: GoalStatus) -> bool {
        if self.status == status {
            return false;
        }
        let now = Utc::now().max(self.updated_at);
        self.status = status;
        self.updated_at = now;
        self.completed_at = status.is_terminal().then_some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_starts_pending() {
        let goal = Goal::new("Ship the release");
        assert_eq!(goal.status, GoalStatus::Pending);
        assert!(goal.task_ids.is_empty());
        assert!(goal.completed_at.is_none());
    }

    #[test]
    fn test_set_status_tracks_completion() {
        let mut goal = Goal::new("Ship the release");
        assert!(goal.set_status(GoalStatus::InProgress));
        assert!(!goal.set_status(GoalStatus::InProgress));
        assert!(goal.completed_at.is_none());

        assert!(goal.set_status(GoalStatus::Completed));
        assert!(goal.completed_at.is_some());

        // An operator requeue can pull a failed goal back into progress
        goal.set_status(GoalStatus::Failed);
        goal.set_status(GoalStatus::InProgress);
        assert!(goal.completed_at.is_none());
    }

    #[test]
    fn test_status_names() {
        assert_eq!(GoalStatus::from_str("in_progress"), Some(GoalStatus::InProgress));
        assert_eq!(GoalStatus::Failed.to_string(), "failed");
    }
}
