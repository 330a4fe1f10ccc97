//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::rca::RcaService;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Analysis service owning the engine, storage and exporter.
    pub service: RcaService,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, service: RcaService) -> Self {
        tracing::info!(
            generator_pipe = %config.pipes.generator,
            validator_pipe = %config.pipes.validator,
            vision_pipe = ?config.pipes.vision,
            max_depth = config.analysis.max_depth,
            "AppState initializing"
        );
        Self { config, service }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;


#[cfg(test)]
mod tests {
    use super::test_support::shared_state;
    use super::*;
    use crate::gateway::MockGateway;
    use crate::storage::Storage;

    #[tokio::test]
    async fn test_app_state_config_access() {
        let dir = tempfile::tempdir().unwrap();
        let state = shared_state(MockGateway::new(), dir.path()).await;

        assert_eq!(state.config.gateway.api_key, "test-key");
        assert_eq!(state.config.analysis.max_depth, 5);
        assert_eq!(state.config.analysis.report_dir, dir.path());
        assert_eq!(state.service.engine().max_depth(), 5);
    }

    #[tokio::test]
    async fn test_handlers_share_one_service() {
        let dir = tempfile::tempdir().unwrap();
        let mut gateway = MockGateway::new();
        gateway
            .expect_generate()
            .returning(|_, _, _| Ok("Why did the queue back up?".to_string()));
        let state = shared_state(gateway, dir.path()).await;
        let other = Arc::clone(&state);

        let started = state.service.start_session("Queue backlog").await.unwrap();
        let seen = other.service.get_session(&started.session_id).await.unwrap();
        assert_eq!(seen.state.problem(), "Queue backlog");
    }

    #[tokio::test]
    async fn test_app_state_storage_access() {
        let dir = tempfile::tempdir().unwrap();
        let state = shared_state(MockGateway::new(), dir.path()).await;

        assert_eq!(state.service.storage().session_count().await.unwrap(), 0);
        assert!(state
            .service
            .storage()
            .get_session("unknown")
            .await
            .unwrap()
            .is_none());
    }
}
