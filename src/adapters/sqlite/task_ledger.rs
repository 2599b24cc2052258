//! SQLite implementation of the TaskLedger.
//!
//! The compare-and-swap is a single `UPDATE … WHERE id = ? AND status = ?
//! AND retry_count = ?`; zero affected rows means the caller's view is stale.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Complexity, Task, TaskStatus, TaskTransition};
use crate::domain::ports::TaskLedger;

#[derive(Clone)]
pub struct SqliteTaskLedger {
    pool: SqlitePool,
}

impl SqliteTaskLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }
}

/// Stamp and insert one task on `conn`.
async fn insert_task(conn: &mut SqliteConnection, mut task: Task) -> DomainResult<Task> {
    task.validate().map_err(DomainError::ValidationFailed)?;
    let now = Utc::now();
    task.created_at = now;
    task.updated_at = now;
    task.started_at = None;
    task.completed_at = None;
    task.version = 1;

    let dependencies = serde_json::to_string(&task.dependencies)?;
    let result = task.result.as_ref().map(serde_json::to_string).transpose()?;

    sqlx::query(
        r#"INSERT INTO tasks (id, goal_id, title, description, status, priority, assigned_agent,
           dependencies, result, error, retry_count, max_retries, complexity, deadline, version,
           created_at, updated_at, started_at, completed_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(task.id.to_string())
    .bind(task.goal_id.to_string())
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(task.priority)
    .bind(&task.assigned_agent)
    .bind(&dependencies)
    .bind(&result)
    .bind(&task.error)
    .bind(task.retry_count as i64)
    .bind(task.max_retries as i64)
    .bind(task.complexity.as_str())
    .bind(task.deadline.map(|t| t.to_rfc3339()))
    .bind(task.version as i64)
    .bind(task.created_at.to_rfc3339())
    .bind(task.updated_at.to_rfc3339())
    .bind(task.started_at.map(|t| t.to_rfc3339()))
    .bind(task.completed_at.map(|t| t.to_rfc3339()))
    .execute(&mut *conn)
    .await?;

    Ok(task)
}

#[async_trait]
impl TaskLedger for SqliteTaskLedger {
    async fn create(&self, task: Task) -> DomainResult<Task> {
        let mut conn = self.pool.acquire().await?;
        insert_task(&mut conn, task).await
    }

    async fn create_all(&self, tasks: Vec<Task>) -> DomainResult<Vec<Task>> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(tasks.len());
        for task in tasks {
            stored.push(insert_task(&mut tx, task).await?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> DomainResult<Task> {
        self.fetch(id).await?.ok_or(DomainError::TaskNotFound(id))
    }

    async fn list(&self, goal_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE goal_id = ? ORDER BY rowid")
                .bind(goal_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn update(&self, id: Uuid, transition: &TaskTransition) -> DomainResult<Task> {
        let current = self.get(id).await?;
        let mut next = current.clone();
        // Validates the expectation and the edge, and computes the new row
        next.apply_transition(transition, Utc::now())?;

        let result = next.result.as_ref().map(serde_json::to_string).transpose()?;
        let outcome = sqlx::query(
            r#"UPDATE tasks SET status = ?, retry_count = ?, result = ?, error = ?,
               version = version + 1, updated_at = ?, started_at = ?, completed_at = ?
               WHERE id = ? AND status = ? AND retry_count = ?"#,
        )
        .bind(next.status.as_str())
        .bind(next.retry_count as i64)
        .bind(&result)
        .bind(&next.error)
        .bind(next.updated_at.to_rfc3339())
        .bind(next.started_at.map(|t| t.to_rfc3339()))
        .bind(next.completed_at.map(|t| t.to_rfc3339()))
        .bind(id.to_string())
        .bind(transition.expected_status.as_str())
        .bind(transition.expected_retry_count as i64)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            let actual = self.get(id).await?;
            return Err(DomainError::conflict(
                id,
                format!(
                    "{}/{}",
                    transition.expected_status, transition.expected_retry_count
                ),
                format!("{}/{}", actual.status, actual.retry_count),
            ));
        }

        self.get(id).await
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    goal_id: String,
    title: String,
    description: String,
    status: String,
    priority: i64,
    assigned_agent: Option<String>,
    dependencies: String,
    result: Option<String>,
    error: Option<String>,
    retry_count: i64,
    max_retries: i64,
    complexity: String,
    deadline: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;
        let complexity = Complexity::from_str(&row.complexity).ok_or_else(|| {
            DomainError::Serialization(format!("Invalid complexity: {}", row.complexity))
        })?;
        let result = row
            .result
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(Task {
            id: parse_uuid(&row.id)?,
            goal_id: parse_uuid(&row.goal_id)?,
            title: row.title,
            description: row.description,
            status,
            priority: row.priority as i32,
            assigned_agent: row.assigned_agent,
            dependencies: serde_json::from_str(&row.dependencies)?,
            result,
            error: row.error,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            complexity,
            deadline: parse_optional_datetime(row.deadline)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            started_at: parse_optional_datetime(row.started_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            version: row.version as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use serde_json::json;

    async fn ledger() -> SqliteTaskLedger {
        SqliteTaskLedger::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_round_trips_task_fields() {
        let ledger = ledger().await;
        let dep = Uuid::new_v4();
        let task = Task::new(Uuid::new_v4(), "build", "compile everything")
            .with_priority(7)
            .with_agent("builder")
            .with_dependency(dep)
            .with_complexity(Complexity::Complex)
            .with_max_retries(5);

        let stored = ledger.create(task.clone()).await.unwrap();
        let loaded = ledger.get(task.id).await.unwrap();
        assert_eq!(loaded.title, "build");
        assert_eq!(loaded.priority, 7);
        assert_eq!(loaded.assigned_agent.as_deref(), Some("builder"));
        assert_eq!(loaded.dependencies, vec![dep]);
        assert_eq!(loaded.complexity, Complexity::Complex);
        assert_eq!(loaded.max_retries, 5);
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn test_cas_update_and_conflict() {
        let ledger = ledger().await;
        let task = ledger.create(Task::new(Uuid::nil(), "a", "d")).await.unwrap();

        let claim = TaskTransition::from_observed(&task, TaskStatus::InProgress);
        let running = ledger.update(task.id, &claim).await.unwrap();
        assert_eq!(running.status, TaskStatus::InProgress);
        assert_eq!(running.version, 2);
        assert!(running.started_at.is_some());

        let err = ledger.update(task.id, &claim).await.unwrap_err();
        assert!(err.is_conflict());

        let done = TaskTransition::from_observed(&running, TaskStatus::Completed)
            .with_result(json!({"ok": true}));
        let completed = ledger.update(task.id, &done).await.unwrap();
        assert_eq!(completed.result, Some(json!({"ok": true})));
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_task_is_not_found() {
        let ledger = ledger().await;
        let ghost = Task::new(Uuid::nil(), "ghost", "d");
        let transition = TaskTransition::from_observed(&ghost, TaskStatus::InProgress);
        assert!(matches!(
            ledger.update(ghost.id, &transition).await,
            Err(DomainError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_all_rolls_back_on_error() {
        let ledger = ledger().await;
        let goal = Uuid::new_v4();
        let first = Task::new(goal, "first", "d");
        let duplicate = first.clone();

        assert!(ledger.create_all(vec![first, duplicate]).await.is_err());
        assert!(ledger.list(goal).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let ledger = ledger().await;
        let goal = Uuid::new_v4();
        let tasks: Vec<Task> = ["c", "a", "b"].iter().map(|t| Task::new(goal, *t, "d")).collect();
        ledger.create_all(tasks).await.unwrap();

        let titles: Vec<String> = ledger.list(goal).await.unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
    }
}
