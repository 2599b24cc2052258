//! Task ledger port.
//!
//! The ledger is the single source of truth for task state. All cross-worker
//! coordination goes through `update`, an atomic compare-and-swap on
//! `(status, retry_count)`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskTransition};

#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Record a new task. The ledger stamps `created_at`/`updated_at`.
    async fn create(&self, task: Task) -> DomainResult<Task>;

    /// Record a goal's tasks as one unit; either all are stored or none.
    async fn create_all(&self, tasks: Vec<Task>) -> DomainResult<Vec<Task>>;

    /// Get a task by ID, `TaskNotFound` when absent.
    async fn get(&self, id: Uuid) -> DomainResult<Task>;

    /// Tasks of a goal in creation order.
    async fn list(&self, goal_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Apply `transition` if the stored `(status, retry_count)` still matches.
    ///
    /// Fails with `Conflict` on a stale expectation; the caller must re-read.
    async fn update(&self, id: Uuid, transition: &TaskTransition) -> DomainResult<Task>;
}
