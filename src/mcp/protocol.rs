//! Wire format for the record server: line-delimited JSON-RPC 2.0 carrying
//! `initialize`, `ping` and the two `tools/*` methods.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Protocol version announced when the client asks for one we do not know
pub const MCP_VERSION: &str = "2025-06-18";

pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

pub const JSONRPC_VERSION: &str = "2.0";

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Text(String),
}

/// A request the server could not answer with a result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),
}

impl RpcFailure {
    #[inline]
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    jsonrpc: Option<String>,
    id: Option<RequestId>,
    method: Option<String>,
    params: Option<Value>,
}

/// One decoded line from the client
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
    },
    /// A response to something we never send; dropped
    Reply,
}

impl Inbound {
    #[inline]
    pub fn decode(line: &str) -> Result<Self, RpcFailure> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| RpcFailure::Parse(e.to_string()))?;
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|e| RpcFailure::InvalidRequest(e.to_string()))?;

        match envelope.jsonrpc.as_deref() {
            Some(JSONRPC_VERSION) => {}
            Some(other) => {
                return Err(RpcFailure::InvalidRequest(format!(
                    "unsupported jsonrpc version {}",
                    other
                )));
            }
            None => {
                return Err(RpcFailure::InvalidRequest(
                    "missing jsonrpc version".to_string(),
                ));
            }
        }

        match (envelope.id, envelope.method) {
            (Some(id), Some(method)) => Ok(Self::Request {
                id,
                method,
                params: envelope.params,
            }),
            (None, Some(method)) => Ok(Self::Notification { method }),
            (Some(_), None) => Ok(Self::Reply),
            (None, None) => Err(RpcFailure::InvalidRequest("missing method".to_string())),
        }
    }
}

/// Deserialize request params, treating absent params as invalid
#[inline]
pub fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcFailure> {
    let params = params.ok_or_else(|| RpcFailure::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| RpcFailure::InvalidParams(e.to_string()))
}

#[inline]
pub fn encode<T: Serialize>(value: &T) -> Result<Value, RpcFailure> {
    serde_json::to_value(value).map_err(|e| RpcFailure::Internal(e.to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

/// One line written back to the client. `id` is null when the request
/// could not be read far enough to find it.
#[derive(Debug, Clone, Serialize)]
pub struct Outbound {
    jsonrpc: &'static str,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Outbound {
    #[inline]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    #[inline]
    pub fn failure(id: Option<RequestId>, failure: &RpcFailure) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(ErrorBody {
                code: failure.code(),
                message: failure.to_string(),
            }),
        }
    }
}

/// Name and version of either end of the connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client_info: Option<PeerInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: PeerInfo,
    pub instructions: &'static str,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Serialize)]
pub struct ListToolsResult<'a> {
    pub tools: Vec<&'a Tool>,
}

#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl CallToolResult {
    #[inline]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// A tool-level failure, reported as content rather than a JSON-RPC error
    #[inline]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }
}
