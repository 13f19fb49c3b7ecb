//! MCP (Model Context Protocol) server over stdio.
//!
//! JSON-RPC 2.0, protocol version 2025-06-18. Exposes the record tools
//! defined in [`tools`].


pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{ConnectionState, McpServer, RegisteredTool, ToolHandler};
pub use tools::register_tools;
