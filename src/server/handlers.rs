use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{AppError, McpError, McpResult};
use crate::gateway::EvidenceRef;

/// Arguments for `rca_start`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartParams {
    /// Problem or incident to analyze.
    pub problem: String,
}

/// Arguments for `rca_answer`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerParams {
    pub session_id: String,
    /// Answer to the pending why question.
    pub answer: String,
    /// Improved answer used if the first one is sent back.
    #[serde(default)]
    pub improved_answer: Option<String>,
    /// Reference to uploaded evidence (URL or path).
    #[serde(default)]
    pub evidence_ref: Option<String>,
}

/// Arguments for tools that only address a session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionParams {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct CleanupResult {
    session_id: String,
    deleted: bool,
}

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "rca_start" => handle_start(state, arguments).await,
        "rca_answer" => handle_answer(state, arguments).await,
        "rca_generate_report" => handle_generate_report(state, arguments).await,
        "rca_get_report" => handle_get_report(state, arguments).await,
        "rca_get_session" => handle_get_session(state, arguments).await,
        "rca_cleanup" => handle_cleanup(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

async fn handle_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("rca_start", arguments, |params: StartParams| async move {
        state.service.start_session(&params.problem).await
    })
    .await
}

async fn handle_answer(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("rca_answer", arguments, |params: AnswerParams| async move {
        let evidence = params
            .evidence_ref
            .filter(|r| !r.trim().is_empty())
            .map(EvidenceRef::new);
        state
            .service
            .submit_answer(
                &params.session_id,
                &params.answer,
                params.improved_answer.as_deref(),
                evidence,
            )
            .await
    })
    .await
}

async fn handle_generate_report(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "rca_generate_report",
        arguments,
        |params: SessionParams| async move {
            state.service.generate_report(&params.session_id).await
        },
    )
    .await
}

async fn handle_get_report(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("rca_get_report", arguments, |params: SessionParams| async move {
        state.service.get_report(&params.session_id).await
    })
    .await
}

async fn handle_get_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("rca_get_session", arguments, |params: SessionParams| async move {
        state.service.get_session(&params.session_id).await
    })
    .await
}

async fn handle_cleanup(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("rca_cleanup", arguments, |params: SessionParams| async move {
        state.service.cleanup_session(&params.session_id).await?;
        Ok::<_, AppError>(CleanupResult {
            session_id: params.session_id,
            deleted: true,
        })
    })
    .await
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse typed arguments, run the operation and serialize its result.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: Into<McpError>,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params).await.map_err(Into::<McpError>::into)?;

    serde_json::to_value(result).map_err(McpError::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use serde_json::json;

    #[test]
    fn test_parse_answer_params_optional_fields() {
        let params: AnswerParams = parse_arguments(
            "rca_answer",
            Some(json!({"session_id": "s1", "answer": "Disk full"})),
        )
        .unwrap();
        assert_eq!(params.session_id, "s1");
        assert_eq!(params.answer, "Disk full");
        assert!(params.improved_answer.is_none());
        assert!(params.evidence_ref.is_none());
    }

    #[test]
    fn test_parse_answer_params_all_fields() {
        let params: AnswerParams = parse_arguments(
            "rca_answer",
            Some(json!({
                "session_id": "s1",
                "answer": "It broke",
                "improved_answer": "The cron entry was removed",
                "evidence_ref": "uploads/cron.png"
            })),
        )
        .unwrap();
        assert_eq!(
            params.improved_answer.as_deref(),
            Some("The cron entry was removed")
        );
        assert_eq!(params.evidence_ref.as_deref(), Some("uploads/cron.png"));
    }

    #[test]
    fn test_parse_arguments_missing_arguments() {
        let err = parse_arguments::<StartParams>("rca_start", None).unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));
        assert!(err.to_string().contains("Missing arguments"));
        assert!(err.to_string().contains("rca_start"));
    }

    #[test]
    fn test_parse_arguments_missing_field() {
        let err = parse_arguments::<AnswerParams>("rca_answer", Some(json!({"session_id": "s1"})))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));
        assert!(err.to_string().contains("answer"));
    }

    #[test]
    fn test_parse_arguments_wrong_type() {
        let err = parse_arguments::<StartParams>("rca_start", Some(json!({"problem": 42})))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn test_execute_handler_maps_errors() {
        let arguments = Some(json!({"problem": "p"}));
        let result = execute_handler("rca_start", arguments, |_: StartParams| async {
            Err::<(), _>(AppError::from(GatewayError::Timeout { timeout_ms: 50 }))
        })
        .await;
        match result {
            Err(McpError::ExecutionFailed { message }) => {
                assert_eq!(message, "Gateway error: Request timeout after 50ms")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_handler_serializes_result() {
        let value = execute_handler(
            "rca_cleanup",
            Some(json!({"session_id": "s1"})),
            |params: SessionParams| async move {
                Ok::<_, AppError>(CleanupResult {
                    session_id: params.session_id,
                    deleted: true,
                })
            },
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"session_id": "s1", "deleted": true}));
    }
}
