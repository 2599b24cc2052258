//! Task domain model.
//!
//! Tasks are atomic units of work assigned to one agent.
//! Within a goal they form a DAG through `dependencies`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or for a free worker
    Pending,
    /// Claimed by exactly one worker
    InProgress,
    /// Finished successfully, `result` is set
    Completed,
    /// Retries exhausted, `error` is set
    Failed,
    /// An upstream dependency failed or was killed
    Blocked,
    /// Cancelled by an operator; never retried
    Killed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Killed => "killed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "running" => Some(Self::InProgress),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            "killed" => Some(Self::Killed),
            _ => None,
        }
    }

    /// Terminal from the scheduler's point of view.
    ///
    /// `Failed` can still be requeued by an operator, but the scheduler never
    /// leaves it on its own.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Killed)
    }

    /// A dependency in this state can never become `Completed` without operator action.
    pub const fn is_fatal_for_dependents(&self) -> bool {
        matches!(self, Self::Failed | Self::Killed | Self::Blocked)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Pending => vec![Self::InProgress, Self::Blocked, Self::Killed],
            Self::Blocked => vec![Self::Pending, Self::Killed],
            // InProgress -> Pending is a business retry
            Self::InProgress => vec![Self::Completed, Self::Pending, Self::Failed, Self::Killed],
            // Failed -> Pending is an explicit operator re-dispatch
            Self::Failed => vec![Self::Pending],
            Self::Completed | Self::Killed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated complexity, one of the scoring factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
}

impl Default for Complexity {
    fn default() -> Self {
        Self::Moderate
    }
}

impl Complexity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trivial" => Some(Self::Trivial),
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }

    /// Normalized to `[0, 1]`, higher is harder.
    pub const fn normalized(&self) -> f64 {
        match self {
            Self::Trivial => 0.0,
            Self::Simple => 1.0 / 3.0,
            Self::Moderate => 2.0 / 3.0,
            Self::Complex => 1.0,
        }
    }
}

/// A discrete unit of work that can be executed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Owning goal
    pub goal_id: Uuid,
    /// Short plan-local name (e.g. `build`)
    pub title: String,
    /// Detailed description handed to the agent
    pub description: String,
    /// Current status
    pub status: TaskStatus,
    /// Higher is more urgent
    pub priority: i32,
    /// Opaque agent identifier
    pub assigned_agent: Option<String>,
    /// Task IDs this depends on
    pub dependencies: Vec<Uuid>,
    /// Set only when `Completed`
    pub result: Option<serde_json::Value>,
    /// Set only when `Failed`
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub complexity: Complexity,
    /// Optional deadline, feeds time sensitivity
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Bumped by the ledger on every write
    pub version: u64,
}

impl Task {
    pub fn new(goal_id: Uuid, title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            goal_id,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::default(),
            priority: 0,
            assigned_agent: None,
            dependencies: Vec::new(),
            result: None,
            error: None,
            retry_count: 0,
            max_retries: 3,
            complexity: Complexity::default(),
            deadline: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    /// Add a dependency. Duplicates and self references are ignored.
    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if !self.dependencies.contains(&task_id) && task_id != self.id {
            self.dependencies.push(task_id);
        }
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.assigned_agent = Some(agent.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub const fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Apply a compare-and-swap transition.
    ///
    /// Only ledgers call this; `now` comes from the ledger clock and is
    /// clamped so `updated_at` never moves backwards.
    pub fn apply_transition(
        &mut self,
        transition: &TaskTransition,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status != transition.expected_status
            || self.retry_count != transition.expected_retry_count
        {
            return Err(DomainError::conflict(
                self.id,
                format!(
                    "{}/{}",
                    transition.expected_status, transition.expected_retry_count
                ),
                format!("{}/{}", self.status, self.retry_count),
            ));
        }
        if !self.status.can_transition_to(transition.status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: transition.status,
            });
        }

        let now = now.max(self.updated_at);
        self.status = transition.status;
        self.retry_count = transition.retry_count;
        self.result = match transition.status {
            TaskStatus::Completed => transition.result.clone(),
            _ => None,
        };
        self.error = match transition.status {
            TaskStatus::Failed => transition.error.clone(),
            _ => None,
        };
        match transition.status {
            TaskStatus::InProgress => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Killed => {
                self.completed_at = Some(now);
            }
            TaskStatus::Pending | TaskStatus::Blocked => self.completed_at = None,
        }
        self.updated_at = now;
        self.version += 1;
        Ok(())
    }

    /// Validate a freshly built task before it enters the ledger.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if self.dependencies.contains(&self.id) {
            return Err(format!("Task {} cannot depend on itself", self.title));
        }
        Ok(())
    }
}

/// Compare-and-swap mutation for the ledger.
///
/// Every mutation names the `(status, retry_count)` it expects to find.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskTransition {
    pub expected_status: TaskStatus,
    pub expected_retry_count: u32,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TaskTransition {
    /// Transition from the state observed in `task` to `status`, keeping `retry_count`.
    pub fn from_observed(task: &Task, status: TaskStatus) -> Self {
        Self {
            expected_status: task.status,
            expected_retry_count: task.retry_count,
            status,
            retry_count: task.retry_count,
            result: None,
            error: None,
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}
