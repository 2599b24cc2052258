//! Domain errors for the taskwarden scheduler.

use thiserror::Error;
use uuid::Uuid;

use super::models::TaskStatus;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[Uuid]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors that can occur while scheduling or governing tasks.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A ledger compare-and-swap observed a stale read.
    ///
    /// The caller re-reads the task and re-decides; this is never a business retry.
    #[error("Ledger conflict on task {task_id}: expected {expected}, found {actual}")]
    Conflict {
        task_id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    CyclicDependency(Vec<Uuid>),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Goal not found: {0}")]
    GoalNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Instruction not found: {0}")]
    InstructionNotFound(Uuid),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(Uuid),

    #[error("Escalation not found: {0}")]
    EscalationNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The escalation sink could not deliver a notification.
    #[error("Escalation delivery failed: {0}")]
    EscalationDelivery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn conflict(task_id: Uuid, expected: impl ToString, actual: impl ToString) -> Self {
        Self::Conflict {
            task_id,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DomainError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
