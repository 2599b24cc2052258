use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Goal;
use crate::domain::ports::GoalRepository;

#[derive(Default)]
pub struct InMemoryGoalRepository {
    goals: RwLock<(HashMap<Uuid, Goal>, Vec<Uuid>)>,
}

impl InMemoryGoalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GoalRepository for InMemoryGoalRepository {
    async fn create(&self, goal: &Goal) -> DomainResult<()> {
        let mut guard = self.goals.write().await;
        let (goals, order) = &mut *guard;
        if goals.contains_key(&goal.id) {
            return Err(DomainError::ValidationFailed(format!(
                "goal {} already exists",
                goal.id
            )));
        }
        goals.insert(goal.id, goal.clone());
        order.push(goal.id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Goal> {
        self.goals
            .read()
            .await
            .0
            .get(&id)
            .cloned()
            .ok_or(DomainError::GoalNotFound(id))
    }

    async fn update(&self, goal: &Goal) -> DomainResult<()> {
        let mut guard = self.goals.write().await;
        let stored = guard
            .0
            .get_mut(&goal.id)
            .ok_or(DomainError::GoalNotFound(goal.id))?;
        *stored = goal.clone();
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Goal>> {
        let guard = self.goals.read().await;
        let (goals, order) = &*guard;
        Ok(order.iter().filter_map(|id| goals.get(id)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GoalStatus;

    #[tokio::test]
    async fn test_goal_crud() {
        let repo = InMemoryGoalRepository::new();
        let mut goal = Goal::new("ship it");
        repo.create(&goal).await.unwrap();
        assert!(repo.create(&goal).await.is_err());

        goal.set_status(GoalStatus::InProgress);
        repo.update(&goal).await.unwrap();
        assert_eq!(repo.get(goal.id).await.unwrap().status, GoalStatus::InProgress);

        let missing = Goal::new("nope");
        assert!(matches!(
            repo.update(&missing).await,
            Err(DomainError::GoalNotFound(_))
        ));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
