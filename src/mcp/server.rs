//! Tool registry and the stdio loop. Each request line gets exactly one
//! response line; notifications and stray replies get none.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::mcp::protocol::{
    CallToolParams, CallToolResult, Inbound, InitializeParams, InitializeResult, ListToolsResult,
    MCP_VERSION, Outbound, PeerInfo, RequestId, RpcFailure, SUPPORTED_PROTOCOL_VERSIONS,
    ServerCapabilities, Tool, decode_params, encode,
};
use crate::{RagError, Result};

type MethodResult = std::result::Result<Value, RpcFailure>;

const INSTRUCTIONS: &str = "Answers questions about the user records of a user management system. \
     Use ask_records for answers, search_records for the raw matching records.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// `RagError::Validation` becomes an invalid-params reply; any other
    /// error becomes an internal error.
    async fn handle(&self, arguments: &Map<String, Value>) -> Result<CallToolResult>;
}

pub struct RegisteredTool {
    pub definition: Tool,
    handler: Box<dyn ToolHandler>,
}

pub struct McpServer {
    pub server_info: PeerInfo,
    /// Keyed by name, so listing is already sorted
    pub tools: RwLock<BTreeMap<String, RegisteredTool>>,
    connection_state: RwLock<ConnectionState>,
}

impl McpServer {
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        Self {
            server_info: PeerInfo { name, version },
            tools: RwLock::new(BTreeMap::new()),
            connection_state: RwLock::new(ConnectionState::Uninitialized),
        }
    }

    #[inline]
    pub async fn register_tool<H>(&self, definition: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        debug!("Registered tool: {}", definition.name);
        self.tools.write().await.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler: Box::new(handler),
            },
        );
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.connection_state.write().await = state;
    }

    #[inline]
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        let mut stdout = io::stdout();
        self.serve(BufReader::new(io::stdin()), &mut stdout).await
    }

    /// Answer newline-delimited messages from `reader` until EOF
    #[inline]
    pub async fn serve<R, W>(&self, reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.pump(reader, writer).await;
        self.set_state(ConnectionState::Closed).await;
        info!("MCP connection closed");
        result
    }

    async fn pump<R, W>(&self, reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(reply) = self.dispatch(line).await {
                let mut encoded =
                    serde_json::to_string(&reply).map_err(|e| RagError::Mcp(e.to_string()))?;
                encoded.push('\n');
                writer.write_all(encoded.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    /// The reply for one raw line, if it needs one
    #[inline]
    pub async fn dispatch(&self, line: &str) -> Option<Outbound> {
        match Inbound::decode(line) {
            Err(failure) => {
                warn!("Rejected message: {}", failure);
                Some(Outbound::failure(None, &failure))
            }
            Ok(Inbound::Notification { method }) => {
                self.on_notification(&method).await;
                None
            }
            Ok(Inbound::Reply) => {
                debug!("Ignoring response message from client");
                None
            }
            Ok(Inbound::Request { id, method, params }) => {
                Some(self.on_request(id, &method, params).await)
            }
        }
    }

    async fn on_notification(&self, method: &str) {
        match method {
            "notifications/initialized" | "initialized" => {
                self.set_state(ConnectionState::Ready).await;
                info!("Client ready");
            }
            "notifications/cancelled" => debug!("Client cancelled a request"),
            other => debug!("Ignoring notification {}", other),
        }
    }

    async fn on_request(&self, id: RequestId, method: &str, params: Option<Value>) -> Outbound {
        let result = match method {
            "initialize" => match decode_params(params) {
                Ok(params) => self.initialize(params).await,
                Err(failure) => Err(failure),
            },
            "tools/list" => self.list_tools().await,
            "tools/call" => match decode_params(params) {
                Ok(params) => self.call_tool(params).await,
                Err(failure) => Err(failure),
            },
            "ping" => Ok(json!({})),
            other => Err(RpcFailure::MethodNotFound(other.to_string())),
        };

        match result {
            Ok(value) => Outbound::success(id, value),
            Err(failure) => {
                warn!("{} failed: {}", method, failure);
                Outbound::failure(Some(id), &failure)
            }
        }
    }

    /// Echo the client's protocol version when we speak it, else offer ours
    async fn initialize(&self, params: InitializeParams) -> MethodResult {
        let supported = SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str());
        let protocol_version = if supported {
            params.protocol_version
        } else {
            warn!(
                "Client asked for protocol {}, offering {}",
                params.protocol_version, MCP_VERSION
            );
            MCP_VERSION.to_string()
        };

        self.set_state(ConnectionState::Initializing).await;
        if let Some(client) = &params.client_info {
            info!("Client connected: {} {}", client.name, client.version);
        }

        encode(&InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities::default(),
            server_info: self.server_info.clone(),
            instructions: INSTRUCTIONS,
        })
    }

    async fn list_tools(&self) -> MethodResult {
        let tools = self.tools.read().await;
        encode(&ListToolsResult {
            tools: tools.values().map(|tool| &tool.definition).collect(),
        })
    }

    async fn call_tool(&self, params: CallToolParams) -> MethodResult {
        let tools = self.tools.read().await;
        let tool = tools
            .get(&params.name)
            .ok_or_else(|| RpcFailure::InvalidParams(format!("Tool not found: {}", params.name)))?;

        let result = tool
            .handler
            .handle(&params.arguments)
            .await
            .map_err(|e| match e {
                RagError::Validation(message) => RpcFailure::InvalidParams(message),
                other => RpcFailure::Internal(other.to_string()),
            })?;
        encode(&result)
    }
}
