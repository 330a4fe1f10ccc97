use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{Invocation, SessionRecord, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::rca::{SessionState, SessionStatus};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// In-memory database on a single pinned connection, for tests and dry runs.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // Every connection to :memory: is its own database; keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    #[cfg(test)]
    pub(crate) async fn session_count(&self) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let state = serde_json::to_string(&session.state)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, problem, status, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.problem)
        .bind(session.status.as_str())
        .bind(&state)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(session_id = %session.id, status = %session.status, "Session created");
        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, problem, status, state, created_at, updated_at
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRecord::try_from).transpose()
    }

    async fn update_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let state = serde_json::to_string(&session.state)?;

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, state = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(session.status.as_str())
        .bind(&state)
        .bind(session.updated_at.to_rfc3339())
        .bind(&session.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: session.id.clone(),
            });
        }

        debug!(session_id = %session.id, status = %session.status, "Session updated");
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: id.to_string(),
            });
        }

        sqlx::query("DELETE FROM invocations WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()> {
        let input = serde_json::to_string(&invocation.input)?;
        let output = invocation
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO invocations (id, session_id, tool_name, input, output, latency_ms, success, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invocation.id)
        .bind(&invocation.session_id)
        .bind(&invocation.tool_name)
        .bind(&input)
        .bind(&output)
        .bind(invocation.latency_ms)
        .bind(invocation.success)
        .bind(&invocation.error)
        .bind(invocation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session_invocations(&self, session_id: &str) -> StorageResult<Vec<Invocation>> {
        let rows: Vec<InvocationRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, tool_name, input, output, latency_ms, success, error, created_at
            FROM invocations
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Invocation::from).collect())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    problem: String,
    status: String,
    state: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let state: SessionState = serde_json::from_str(&row.state)?;
        let status = SessionStatus::from_str(&row.status).unwrap_or_else(|_| state.status());

        Ok(Self {
            id: row.id,
            problem: row.problem,
            status,
            state,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct InvocationRow {
    id: String,
    session_id: Option<String>,
    tool_name: String,
    input: String,
    output: Option<String>,
    latency_ms: Option<i64>,
    success: bool,
    error: Option<String>,
    created_at: String,
}

impl From<InvocationRow> for Invocation {
    fn from(row: InvocationRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            tool_name: row.tool_name,
            input: serde_json::from_str(&row.input).unwrap_or(serde_json::Value::Null),
            output: row.output.and_then(|s| serde_json::from_str(&s).ok()),
            latency_ms: row.latency_ms,
            success: row.success,
            error: row.error,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
