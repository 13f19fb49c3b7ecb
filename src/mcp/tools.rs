//! Tools exposed over MCP: ask a question, fetch raw context, and trigger
//! a rebuild of the similarity index.

use crate::answer::AnswerComposer;
use crate::mcp::protocol::{CallToolResult, Tool};
use crate::mcp::server::{McpServer, ToolHandler};
use crate::retrieval::{IndexManager, QueryRouter, RebuildOutcome};
use crate::{RagError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

pub const ASK_RECORDS: &str = "ask_records";
pub const SEARCH_RECORDS: &str = "search_records";
pub const REBUILD_INDEX: &str = "rebuild_index";

pub struct AskRecordsHandler {
    composer: Arc<AnswerComposer>,
}

pub struct SearchRecordsHandler {
    router: Arc<QueryRouter>,
}

pub struct RebuildIndexHandler {
    manager: Arc<IndexManager>,
}

/// A non-blank string argument
fn required_text<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RagError::Validation(format!("Missing required parameter: {}", name)))
}

impl AskRecordsHandler {
    #[inline]
    pub fn new(composer: Arc<AnswerComposer>) -> Self {
        Self { composer }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: ASK_RECORDS.to_string(),
            description: "Answer a natural-language question about the stored user records"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "Question about the users, e.g. 'Who are the admins?'"
                    }
                },
                "required": ["question"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for AskRecordsHandler {
    async fn handle(&self, args: &Map<String, Value>) -> Result<CallToolResult> {
        let question = required_text(args, "question")?;

        debug!("Answering question over MCP: {}", question);
        let answer = self.composer.answer(question).await;
        Ok(CallToolResult::text(answer))
    }
}

impl SearchRecordsHandler {
    #[inline]
    pub fn new(router: Arc<QueryRouter>) -> Self {
        Self { router }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: SEARCH_RECORDS.to_string(),
            description: "Return the user records most relevant to a query, without generating an answer"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchRecordsHandler {
    async fn handle(&self, args: &Map<String, Value>) -> Result<CallToolResult> {
        let query = required_text(args, "query")?;

        debug!("Searching records over MCP: {}", query);
        Ok(CallToolResult::text(self.router.retrieve(query).await))
    }
}

impl RebuildIndexHandler {
    #[inline]
    pub fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: REBUILD_INDEX.to_string(),
            description: "Rebuild the similarity index from the record store".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "wait": {
                        "type": "boolean",
                        "description": "Optional: wait for the rebuild to finish (default: false)"
                    }
                },
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for RebuildIndexHandler {
    async fn handle(&self, args: &Map<String, Value>) -> Result<CallToolResult> {
        let wait = args.get("wait").and_then(Value::as_bool).unwrap_or(false);

        if !wait {
            let message = if self.manager.spawn_rebuild().is_some() {
                "Rebuild started in the background."
            } else {
                "A rebuild is already running."
            };
            return Ok(CallToolResult::text(format!(
                "{} Index state: {}",
                message,
                self.manager.state()
            )));
        }

        let result = match self.manager.rebuild().await {
            RebuildOutcome::Ready { documents } => {
                CallToolResult::text(format!("Index rebuilt with {} documents.", documents))
            }
            RebuildOutcome::Empty => {
                CallToolResult::text("No records to index; the index is empty.")
            }
            RebuildOutcome::AlreadyRunning => {
                CallToolResult::text("A rebuild is already running.")
            }
            RebuildOutcome::Failed { error } => {
                CallToolResult::error(format!("Index rebuild failed: {}", error))
            }
        };
        Ok(result)
    }
}

/// Register every record tool on `server`
#[inline]
pub async fn register_tools(server: &McpServer, composer: &Arc<AnswerComposer>) {
    let router = Arc::clone(composer.router());
    let manager = Arc::clone(router.manager());

    server
        .register_tool(
            AskRecordsHandler::tool_definition(),
            AskRecordsHandler::new(Arc::clone(composer)),
        )
        .await;
    server
        .register_tool(
            SearchRecordsHandler::tool_definition(),
            SearchRecordsHandler::new(router),
        )
        .await;
    server
        .register_tool(
            RebuildIndexHandler::tool_definition(),
            RebuildIndexHandler::new(manager),
        )
        .await;
}
