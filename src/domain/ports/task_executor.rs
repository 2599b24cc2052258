//! Task executor port - the opaque work an agent performs.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::task_ledger::TaskLedger;
use crate::domain::models::{Task, TaskStatus};

/// Handle given to a worker for the duration of one attempt.
#[derive(Clone)]
pub struct ExecutionContext {
    pub task_id: Uuid,
    /// Zero-based attempt number (equals the task's retry count)
    pub attempt: u32,
    ledger: Arc<dyn TaskLedger>,
}

impl ExecutionContext {
    pub fn new(task_id: Uuid, attempt: u32, ledger: Arc<dyn TaskLedger>) -> Self {
        Self {
            task_id,
            attempt,
            ledger,
        }
    }

    /// Workers call this at their own checkpoints and abandon the attempt
    /// once it returns `true`.
    pub async fn is_killed(&self) -> bool {
        matches!(
            self.ledger.get(self.task_id).await,
            Ok(task) if task.status == TaskStatus::Killed
        )
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Executes a claimed task. A returned `Err` is a business failure that
/// feeds the retry policy.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, ctx: &ExecutionContext)
        -> Result<serde_json::Value, String>;
}
