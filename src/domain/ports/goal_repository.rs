//! Goal repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Goal;

/// Repository interface for Goal persistence.
#[async_trait]
pub trait GoalRepository: Send + Sync {
    /// Create a new goal.
    async fn create(&self, goal: &Goal) -> DomainResult<()>;

    /// Get a goal by ID, `GoalNotFound` when absent.
    async fn get(&self, id: Uuid) -> DomainResult<Goal>;

    /// Update an existing goal.
    async fn update(&self, goal: &Goal) -> DomainResult<()>;

    /// List every goal, oldest first.
    async fn list(&self) -> DomainResult<Vec<Goal>>;
}
