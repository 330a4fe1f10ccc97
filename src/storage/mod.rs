//! Storage layer for 5 Whys session persistence.
//!
//! Each session is stored as one row holding the full serialized
//! [`SessionState`], plus a denormalized problem and status for querying.
//! Gateway-backed operations are logged to an invocation table.

mod sqlite;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::rca::{SessionState, SessionStatus};

/// A persisted analysis session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier.
    pub id: String,
    /// Problem statement, copied from the state for listing.
    pub problem: String,
    /// Lifecycle status derived from the state at save time.
    pub status: SessionStatus,
    /// Full session state.
    pub state: SessionState,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a record with a fresh id for `state`.
    pub fn new(state: SessionState) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            problem: state.problem().to_string(),
            status: state.status(),
            state,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the state, refreshing status and `updated_at`.
    pub fn with_state(mut self, state: SessionState) -> Self {
        self.status = state.status();
        self.state = state;
        self.updated_at = Utc::now();
        self
    }
}

/// A logged service operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Session the operation ran against, if one exists yet.
    pub session_id: Option<String>,
    /// Operation name (e.g. `submit_answer`).
    pub tool_name: String,
    /// Input parameters as JSON.
    pub input: serde_json::Value,
    /// Output as JSON (if successful).
    pub output: Option<serde_json::Value>,
    /// Latency in milliseconds.
    pub latency_ms: Option<i64>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    /// When the operation ran.
    pub created_at: DateTime<Utc>,
}

impl Invocation {
    /// Create a new invocation log entry
    pub fn new(tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            tool_name: tool_name.into(),
            input,
            output: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the session ID
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Mark as successful with output
    pub fn success(mut self, output: serde_json::Value, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Storage trait for database operations.
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations

    /// Create a new session.
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>>;
    /// Update an existing session. Fails with `SessionNotFound` if absent.
    async fn update_session(&self, session: &SessionRecord) -> StorageResult<()>;
    /// Delete a session and its invocation log. Fails with `SessionNotFound` if absent.
    async fn delete_session(&self, id: &str) -> StorageResult<()>;

    // Invocation logging

    /// Log an invocation.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
    /// Invocations for a session, oldest first.
    async fn get_session_invocations(&self, session_id: &str) -> StorageResult<Vec<Invocation>>;
}
