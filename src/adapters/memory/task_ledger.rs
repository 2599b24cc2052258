//! In-memory TaskLedger.
//!
//! The compare-and-swap check and the write happen under one write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskTransition};
use crate::domain::ports::TaskLedger;

#[derive(Default)]
struct LedgerState {
    tasks: HashMap<Uuid, Task>,
    /// Insertion order
    order: Vec<Uuid>,
    last_stamp: Option<DateTime<Utc>>,
}

impl LedgerState {
    /// Strictly increasing creation stamps so creation order survives ties.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn check_new(&self, task: &Task) -> DomainResult<()> {
        task.validate().map_err(DomainError::ValidationFailed)?;
        if self.tasks.contains_key(&task.id) {
            return Err(DomainError::ValidationFailed(format!(
                "task {} already exists",
                task.id
            )));
        }
        Ok(())
    }

    fn insert(&mut self, mut task: Task) -> Task {
        let stamp = self.next_stamp();
        task.created_at = stamp;
        task.updated_at = stamp;
        task.started_at = None;
        task.completed_at = None;
        task.version = 1;
        self.order.push(task.id);
        self.tasks.insert(task.id, task.clone());
        task
    }
}

#[derive(Default)]
pub struct InMemoryTaskLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryTaskLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskLedger for InMemoryTaskLedger {
    async fn create(&self, task: Task) -> DomainResult<Task> {
        let mut state = self.state.write().await;
        state.check_new(&task)?;
        Ok(state.insert(task))
    }

    async fn create_all(&self, tasks: Vec<Task>) -> DomainResult<Vec<Task>> {
        let mut state = self.state.write().await;
        let mut seen = std::collections::HashSet::new();
        for task in &tasks {
            state.check_new(task)?;
            if !seen.insert(task.id) {
                return Err(DomainError::ValidationFailed(format!(
                    "task {} appears twice",
                    task.id
                )));
            }
        }
        Ok(tasks.into_iter().map(|t| state.insert(t)).collect())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Task> {
        self.state
            .read()
            .await
            .tasks
            .get(&id)
            .cloned()
            .ok_or(DomainError::TaskNotFound(id))
    }

    async fn list(&self, goal_id: Uuid) -> DomainResult<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|t| t.goal_id == goal_id)
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, transition: &TaskTransition) -> DomainResult<Task> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or(DomainError::TaskNotFound(id))?;
        task.apply_transition(transition, Utc::now())?;
        Ok(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ledger_stamps_timestamps_and_version() {
        let ledger = InMemoryTaskLedger::new();
        let mut task = Task::new(Uuid::nil(), "a", "d");
        task.created_at = DateTime::<Utc>::MIN_UTC;
        task.version = 42;

        let stored = ledger.create(task).await.unwrap();
        assert!(stored.created_at > DateTime::<Utc>::MIN_UTC);
        assert_eq!(stored.created_at, stored.updated_at);
        assert_eq!(stored.version, 1);

        let moved = ledger
            .update(
                stored.id,
                &TaskTransition::from_observed(&stored, TaskStatus::InProgress),
            )
            .await
            .unwrap();
        assert_eq!(moved.version, 2);
        assert!(moved.updated_at >= stored.updated_at);
    }

    #[tokio::test]
    async fn test_creation_order_is_strict() {
        let ledger = InMemoryTaskLedger::new();
        let goal = Uuid::new_v4();
        let tasks: Vec<Task> = (0..20)
            .map(|i| Task::new(goal, format!("t{i}"), "d"))
            .collect();
        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();

        let stored = ledger.create_all(tasks).await.unwrap();
        assert!(stored.windows(2).all(|w| w[0].created_at < w[1].created_at));

        let listed: Vec<Uuid> = ledger.list(goal).await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(listed, ids);
        assert!(ledger.list(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_all_is_all_or_nothing() {
        let ledger = InMemoryTaskLedger::new();
        let goal = Uuid::new_v4();
        let good = Task::new(goal, "good", "d");
        let bad = Task::new(goal, "  ", "d");

        assert!(ledger.create_all(vec![good.clone(), bad]).await.is_err());
        assert!(matches!(
            ledger.get(good.id).await,
            Err(DomainError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_transition_conflicts() {
        let ledger = InMemoryTaskLedger::new();
        let task = ledger.create(Task::new(Uuid::nil(), "a", "d")).await.unwrap();
        let claim = TaskTransition::from_observed(&task, TaskStatus::InProgress);

        ledger.update(task.id, &claim).await.unwrap();
        let err = ledger.update(task.id, &claim).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let ledger = Arc::new(InMemoryTaskLedger::new());
        let task = ledger.create(Task::new(Uuid::nil(), "a", "d")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            let claim = TaskTransition::from_observed(&task, TaskStatus::InProgress);
            handles.push(tokio::spawn(async move { ledger.update(task.id, &claim).await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
