//! MCP over line-delimited JSON-RPC 2.0.
//!
//! Each input line is one request or notification; each response is written
//! as a single line. Tool calls are delegated to [`handle_tool_call`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// MCP protocol revision spoken by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "five-whys-rca";

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Incoming request; `id` is absent for notifications.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Outgoing response. Exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub tools: ToolCapabilities,
}

#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Reply to `initialize`.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Capabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// `params` of a `tools/call` request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Tool output. Failures are reported here with `isError`, not as
/// JSON-RPC errors.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text: text.into(),
            }],
            is_error: None,
        }
    }

    pub fn failure(message: impl std::fmt::Display) -> Self {
        Self {
            is_error: Some(true),
            ..Self::text(format!("Error: {}", message))
        }
    }
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Serialize `result` into a success response, or an internal error.
    fn from_serializable<T: Serialize>(id: Option<Value>, result: T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::success(id, value),
            Err(e) => {
                error!(error = %e, "Failed to serialize result");
                Self::error(id, INTERNAL_ERROR, format!("Internal error: {}", e))
            }
        }
    }
}

/// MCP server bound to the shared application state.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve stdin/stdout until EOF.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Listening on stdio");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve any line-oriented transport until the reader reaches EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        while reader.read_line(&mut line).await? > 0 {
            if let Some(response) = self.dispatch_line(line.trim()).await {
                let encoded = serde_json::to_string(&response)?;
                debug!(response = %encoded, "Sending response");
                writer.write_all(encoded.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            line.clear();
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    async fn dispatch_line(&self, line: &str) -> Option<JsonRpcResponse> {
        if line.is_empty() {
            return None;
        }
        debug!(request = %line, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!(error = %e, "Unparseable request");
                Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle one decoded message. Notifications never get a response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        match method.as_str() {
            "initialize" => Some(self.handle_initialize(id)),
            "tools/list" => Some(self.handle_tools_list(id)),
            "tools/call" => Some(self.handle_tool_call(id, params).await),
            "ping" => Some(JsonRpcResponse::success(id, serde_json::json!({}))),
            _ if id.is_none() => {
                debug!(method = %method, "Notification ignored");
                None
            }
            _ => {
                warn!(method = %method, "Unknown method");
                Some(JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                ))
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!(protocol = PROTOCOL_VERSION, "Client initializing");

        JsonRpcResponse::from_serializable(
            id,
            InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: Capabilities {
                    tools: ToolCapabilities {
                        list_changed: false,
                    },
                },
                server_info: ServerInfo {
                    name: SERVER_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            },
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        debug!("Listing tools");
        JsonRpcResponse::success(id, serde_json::json!({ "tools": tool_definitions() }))
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params");
        };
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e))
            }
        };

        let result = match handle_tool_call(&self.state, &params.name, params.arguments).await {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(text) => ToolCallResult::text(text),
                Err(e) => ToolCallResult::failure(e),
            },
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Tool call failed");
                ToolCallResult::failure(e)
            }
        };

        JsonRpcResponse::from_serializable(id, result)
    }
}

/// All tools exposed by the server, in listing order.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        get_start_tool(),
        get_answer_tool(),
        get_generate_report_tool(),
        get_get_report_tool(),
        get_get_session_tool(),
        get_cleanup_tool(),
    ]
}

fn session_tool(name: &str, description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session ID returned by rca_start"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

fn get_start_tool() -> Tool {
    Tool {
        name: "rca_start".to_string(),
        description: "Start a 5 Whys root cause analysis for a problem. Returns the session ID and the first why question.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "problem": {
                    "type": "string",
                    "description": "The problem or incident to analyze"
                }
            },
            "required": ["problem"],
            "additionalProperties": false
        }),
    }
}

fn get_answer_tool() -> Tool {
    Tool {
        name: "rca_answer".to_string(),
        description: "Answer the pending why question. The answer is rated for specificity and relevance; weak answers are sent back once with a suggestion. Returns the next question, an improvement request, or the extracted root cause.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session ID returned by rca_start"
                },
                "answer": {
                    "type": "string",
                    "description": "Answer to the pending why question"
                },
                "improved_answer": {
                    "type": "string",
                    "description": "Optional improved answer, validated once more if the first answer is sent back"
                },
                "evidence_ref": {
                    "type": "string",
                    "description": "Optional URL or path of supporting evidence (screenshot, graph, log capture)"
                }
            },
            "required": ["session_id", "answer"],
            "additionalProperties": false
        }),
    }
}

fn get_generate_report_tool() -> Tool {
    session_tool(
        "rca_generate_report",
        "Generate the four-section RCA report for a session whose root cause has been extracted, and export it as markdown.",
    )
}

fn get_get_report_tool() -> Tool {
    session_tool(
        "rca_get_report",
        "Fetch the generated report, root cause and confidence score of a session.",
    )
}

fn get_get_session_tool() -> Tool {
    session_tool(
        "rca_get_session",
        "Fetch the full state of a session, including the why chain and the next expected step.",
    )
}

fn get_cleanup_tool() -> Tool {
    session_tool("rca_cleanup", "Delete a session and its invocation log.")
}
