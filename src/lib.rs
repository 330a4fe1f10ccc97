//! # Five Whys RCA
//!
//! An interactive 5 Whys root cause analysis engine exposed as a Model
//! Context Protocol (MCP) server. Each session asks up to five "why"
//! questions, rates every answer for specificity and relevance, extracts a
//! root cause with a confidence score and produces a four-section report.
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → McpServer → RcaService → RcaEngine → Gateway (HTTP pipes)
//!                              ↓
//!                        SQLite (sessions, invocations)
//!                              ↓
//!                        Markdown export
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use five_whys_rca::{Config, AppState, McpServer};
//! use five_whys_rca::export::ReportExporter;
//! use five_whys_rca::gateway::PipeClient;
//! use five_whys_rca::rca::{RcaEngine, RcaService};
//! use five_whys_rca::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let client =
//!         PipeClient::new(&config.gateway, config.request.clone(), config.pipes.clone())?;
//!     let engine = RcaEngine::new(
//!         Arc::new(client),
//!         config.analysis.clone(),
//!         Duration::from_millis(config.request.timeout_ms),
//!     );
//!     let exporter = ReportExporter::new(&config.analysis.report_dir);
//!     let service = RcaService::new(engine, storage, exporter);
//!     let server = McpServer::new(Arc::new(AppState::new(config, service)));
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Markdown export of finished reports.
pub mod export;
/// Generation gateway trait and HTTP pipe client.
pub mod gateway;
/// Prompt builders for every generation step.
pub mod prompts;
/// The 5 Whys state machine and session service.
pub mod rca;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
