//! Model Context Protocol client.
//!
//! The assistant's only tools come from an external MCP server (the
//! Google Maps server by default). A [`ToolConnector`] opens a session,
//! the resulting [`ToolClient`] advertises the server's tools, and each
//! one is wrapped as an [`McpTool`] for the agent's [`ToolRegistry`].
//!
//! [`ToolRegistry`]: shopbot_core::tool::ToolRegistry

pub mod client;
pub mod connector;
pub mod protocol;
pub mod tool;
pub mod transport;

use async_trait::async_trait;
use serde_json::Value;
use shopbot_core::error::ToolError;
use shopbot_core::provider::ToolDefinition;
use shopbot_core::tool::ToolResult;
use std::sync::Arc;

pub use client::McpClient;
pub use connector::McpConnector;
pub use tool::{McpTool, registry_from_client};
pub use transport::{HttpTransport, McpTransport, StdioTransport};

/// A live session with one tool server.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Server name used in logs.
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError>;

    /// Stop the session. Calls after close fail.
    async fn close(&self) -> Result<(), ToolError>;
}

/// Opens new tool-server sessions.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ToolClient>, ToolError>;
}
