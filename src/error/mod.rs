use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Generation gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Empty response from {operation}")]
    EmptyResponse { operation: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Capability not supported: {capability}")]
    Unsupported { capability: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Session state machine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid transition: cannot {action} while {state}")]
    InvalidTransition { state: String, action: String },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },
}

/// Report export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session {session_id} has no report to export")]
    MissingReport { session_id: String },
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

impl AppError {
    /// Whether this error is a gateway failure the caller may retry unchanged.
    pub fn is_gateway_failure(&self) -> bool {
        matches!(self, AppError::Gateway(_))
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type alias for state machine transitions
pub type EngineResult<T> = Result<T, AppError>;

/// Result type alias for report export
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = AppError::Config {
            message: "RCA_MAX_DEPTH must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Configuration error: RCA_MAX_DEPTH must be at least 1"
        );
    }

    #[test]
    fn test_missing_session_display() {
        let err: AppError = StorageError::SessionNotFound {
            session_id: "a1b2".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Storage error: Session not found: a1b2");
    }

    #[test]
    fn test_export_error_display() {
        let err = ExportError::MissingReport {
            session_id: "a1b2".to_string(),
        };
        assert_eq!(err.to_string(), "Session a1b2 has no report to export");

        let err = ExportError::Io {
            path: "/reports/rca_report_a1b2.md".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("Failed to write /reports/rca_report_a1b2.md"));
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Gateway unavailable: server down (retries: 3)");

        let err = GatewayError::EmptyResponse {
            operation: "question".to_string(),
        };
        assert_eq!(err.to_string(), "Empty response from question");

        let err = GatewayError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");

        let err = GatewayError::Unsupported {
            capability: "analyze_evidence".to_string(),
        };
        assert_eq!(err.to_string(), "Capability not supported: analyze_evidence");
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::InvalidTransition {
            state: "no question is pending".to_string(),
            action: "submit an answer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition: cannot submit an answer while no question is pending"
        );

        let err = EngineError::Validation {
            field: "answer".to_string(),
            reason: "cannot be empty".to_string(),
        };
        assert_eq!(err.to_string(), "Validation failed: answer - cannot be empty");
    }

    #[test]
    fn test_gateway_failure_classification() {
        let app_err: AppError = GatewayError::Timeout { timeout_ms: 10 }.into();
        assert!(app_err.is_gateway_failure());

        let app_err: AppError = EngineError::Validation {
            field: "problem".to_string(),
            reason: "empty".to_string(),
        }
        .into();
        assert!(!app_err.is_gateway_failure());
    }

    #[test]
    fn test_engine_error_surfaces_as_tool_failure() {
        let app_err: AppError = EngineError::InvalidTransition {
            state: "a report already exists".to_string(),
            action: "generate a report".to_string(),
        }
        .into();
        let mcp_err: McpError = app_err.into();
        assert_eq!(
            mcp_err.to_string(),
            "Tool execution failed: Engine error: Invalid transition: cannot generate a report while a report already exists"
        );
    }
}
