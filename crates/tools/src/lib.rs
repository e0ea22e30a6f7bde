//! Tool access for shopbot.
//!
//! The agent does not ship built-in tools. Its capabilities come from an
//! external places-search server reached over MCP, either as a child
//! process on stdio or through a streamable HTTP gateway.

pub mod mcp;

pub use mcp::{McpConnector, McpTool, ToolClient, ToolConnector, registry_from_client};
