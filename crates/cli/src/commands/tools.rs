//! `shopbot tools`: List what the MCP server advertises.

use shopbot_security::SecretProvider;
use shopbot_tools::{McpConnector, ToolConnector};
use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let secrets = Arc::new(SecretProvider::from_config(&config));

    let client = McpConnector::new(config.mcp.clone(), secrets).connect().await?;
    let tools = client.list_tools().await;
    if let Err(e) = client.close().await {
        tracing::debug!(error = %e, "MCP close failed");
    }
    let tools = tools?;

    println!("🔧 {} tool(s) from {}", tools.len(), client.name());
    for tool in &tools {
        println!("  {:<28} {}", tool.name, tool.description.lines().next().unwrap_or(""));
    }
    Ok(())
}
