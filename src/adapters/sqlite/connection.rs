//! Opening the ledger database.
//!
//! File ledgers run in WAL mode so a reader never blocks the claim writer.
//! The in-memory pool used by tests is pinned to one connection, since every
//! new `:memory:` connection would see an empty database.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::domain::models::DatabaseConfig;

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot open ledger database: {0}")]
    Open(#[source] sqlx::Error),
    #[error("not a sqlite URL: {0}")]
    BadUrl(String),
    #[error("cannot create ledger directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pool sizing and lock waits for a file-backed ledger.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_idle: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database before `SQLITE_BUSY`.
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_idle: 1,
            acquire_timeout: Duration::from_secs(3),
            busy_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections.max(1),
            ..Self::default()
        }
    }
}

impl PoolConfig {
    fn pool_options(&self) -> SqlitePoolOptions {
        SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_idle.min(self.max_connections))
            .acquire_timeout(self.acquire_timeout)
    }
}

fn parse_url(url: &str) -> Result<SqliteConnectOptions, ConnectionError> {
    SqliteConnectOptions::from_str(url).map_err(|_| ConnectionError::BadUrl(url.to_string()))
}

/// The file behind `url`, or `None` for an in-memory database.
fn ledger_file(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let file = rest.split('?').next().unwrap_or(rest);
    match file {
        "" | ":memory:" => None,
        file => Some(Path::new(file)),
    }
}

/// Open a pool on `database_url`, creating the file and its directory if
/// they do not exist yet.
pub async fn create_pool(
    database_url: &str,
    config: Option<PoolConfig>,
) -> Result<SqlitePool, ConnectionError> {
    let config = config.unwrap_or_default();

    if let Some(dir) = ledger_file(database_url).and_then(Path::parent) {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|source| ConnectionError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;
        }
    }

    let options = parse_url(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout);

    config
        .pool_options()
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(parse_url(MEMORY_URL)?)
        .await
        .map_err(ConnectionError::Open)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_pool_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("ledger.db");
        let url = format!("sqlite:{}", db.display());

        let pool = create_pool(&url, None).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(db.exists());
    }

    #[test]
    fn test_ledger_file_skips_memory_urls() {
        assert_eq!(ledger_file("sqlite::memory:"), None);
        assert_eq!(ledger_file("sqlite:"), None);
        assert_eq!(
            ledger_file("sqlite://data/ledger.db?mode=rwc"),
            Some(Path::new("data/ledger.db"))
        );
        assert_eq!(ledger_file("sqlite:ledger.db"), Some(Path::new("ledger.db")));
    }

    #[test]
    fn test_pool_config_from_database_config() {
        let config = DatabaseConfig {
            max_connections: 0,
            ..DatabaseConfig::default()
        };
        let pool = PoolConfig::from(&config);
        assert_eq!(pool.max_connections, 1);
        assert_eq!(pool.busy_timeout, Duration::from_secs(30));
    }
}
