//! SQLite implementation of the GoalRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Goal, GoalStatus};
use crate::domain::ports::GoalRepository;

#[derive(Clone)]
pub struct SqliteGoalRepository {
    pool: SqlitePool,
}

impl SqliteGoalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GoalRepository for SqliteGoalRepository {
    async fn create(&self, goal: &Goal) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO goals (id, description, status, task_ids, created_at, updated_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(goal.id.to_string())
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(serde_json::to_string(&goal.task_ids)?)
        .bind(goal.created_at.to_rfc3339())
        .bind(goal.updated_at.to_rfc3339())
        .bind(goal.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Goal> {
        let row: Option<GoalRow> = sqlx::query_as("SELECT * FROM goals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(DomainError::GoalNotFound(id))?.try_into()
    }

    async fn update(&self, goal: &Goal) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE goals SET description = ?, status = ?, task_ids = ?,
               updated_at = ?, completed_at = ? WHERE id = ?"#,
        )
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(serde_json::to_string(&goal.task_ids)?)
        .bind(goal.updated_at.to_rfc3339())
        .bind(goal.completed_at.map(|t| t.to_rfc3339()))
        .bind(goal.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::GoalNotFound(goal.id));
        }
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Goal>> {
        let rows: Vec<GoalRow> = sqlx::query_as("SELECT * FROM goals ORDER BY created_at, rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Goal::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct GoalRow {
    id: String,
    description: String,
    status: String,
    task_ids: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TryFrom<GoalRow> for Goal {
    type Error = DomainError;

    fn try_from(row: GoalRow) -> Result<Self, Self::Error> {
        let status = GoalStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;

        Ok(Goal {
            id: parse_uuid(&row.id)?,
            description: row.description,
            status,
            task_ids: serde_json::from_str(&row.task_ids)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}
