//! MCP client: handshake, tool discovery and tool invocation over any
//! [`McpTransport`].

use async_trait::async_trait;
use serde_json::{Value, json};
use shopbot_core::error::ToolError;
use shopbot_core::provider::ToolDefinition;
use shopbot_core::tool::ToolResult;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::ToolClient;
use super::protocol;
use super::transport::McpTransport;

pub struct McpClient {
    server: String,
    transport: Box<dyn McpTransport>,
    next_id: AtomicU64,
}

impl McpClient {
    /// Perform the `initialize` handshake and announce readiness.
    pub async fn connect(server: &str, transport: Box<dyn McpTransport>) -> Result<Self, ToolError> {
        let client = Self {
            server: server.to_string(),
            transport,
            next_id: AtomicU64::new(1),
        };

        let init = client
            .call(
                "initialize",
                protocol::initialize_params("shopbot", env!("CARGO_PKG_VERSION")),
            )
            .await;
        let init = match init {
            Ok(result) => result,
            Err(e) => {
                if let Err(close_err) = client.transport.close().await {
                    debug!(server = %client.server, error = %close_err, "Close after failed initialize");
                }
                return Err(e);
            }
        };

        client
            .transport
            .notify(protocol::notification("notifications/initialized"))
            .await?;

        info!(
            server = %client.server,
            protocol = %init.get("protocolVersion").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "MCP session initialized"
        );
        Ok(client)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .transport
            .request(id, protocol::request(id, method, params))
            .await?;
        protocol::into_result(response).map_err(|e| match e {
            ToolError::Rejected(reason) => {
                ToolError::Rejected(format!("'{}' {method}: {reason}", self.server))
            }
            ToolError::Protocol(reason) => {
                ToolError::Protocol(format!("'{}' {method}: {reason}", self.server))
            }
            other => other,
        })
    }
}

#[async_trait]
impl ToolClient for McpClient {
    fn name(&self) -> &str {
        &self.server
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        let result = self.call("tools/list", json!({})).await?;
        let tools = protocol::parse_tool_list(&result)?;
        info!(server = %self.server, count = tools.len(), "Discovered tools");
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        debug!(server = %self.server, tool = %name, "Calling tool");
        let result = self
            .call("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        Ok(protocol::parse_call_result(result))
    }

    async fn close(&self) -> Result<(), ToolError> {
        self.transport.close().await
    }
}
