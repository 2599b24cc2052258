//! Ledger schema versions compiled into the binary.
//!
//! Each migration runs in its own transaction together with its row in
//! `schema_migrations`, so a crash mid-upgrade leaves the previous version
//! intact.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("schema version {version} failed to apply: {source}")]
    Apply {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("cannot read schema version: {0}")]
    ReadVersion(#[source] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

const LEDGER_SCHEMA: &[Migration] = &[Migration {
    version: 1,
    description: "goals, tasks and compliance records",
    sql: include_str!("../../../migrations/001_initial_schema.sql"),
}];

/// Every schema version this build knows, oldest first.
pub fn all_embedded_migrations() -> &'static [Migration] {
    LEDGER_SCHEMA
}

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    description TEXT,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bring the ledger up to the newest version in `migrations`.
    ///
    /// Returns how many versions were applied; zero when already current.
    pub async fn upgrade(&self, migrations: &[Migration]) -> Result<usize, MigrationError> {
        sqlx::query(VERSION_TABLE)
            .execute(&self.pool)
            .await
            .map_err(MigrationError::ReadVersion)?;

        let from = self.schema_version().await?;
        let mut applied = 0;
        for migration in migrations.iter().filter(|m| m.version > from) {
            self.apply(migration).await?;
            debug!(version = migration.version, description = migration.description, "schema upgraded");
            applied += 1;
        }
        if applied > 0 {
            info!(from, applied, "ledger schema migrated");
        }
        Ok(applied)
    }

    /// Highest applied version, 0 for a fresh database.
    pub async fn schema_version(&self) -> Result<i64, MigrationError> {
        let (version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await
                .map_err(MigrationError::ReadVersion)?;
        Ok(version)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |source| MigrationError::Apply {
            version: migration.version,
            source,
        };

        let mut tx = self.pool.begin().await.map_err(failed)?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)
    }
}
