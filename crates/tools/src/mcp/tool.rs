//! Exposes one server-advertised tool through the core [`Tool`] trait.

use async_trait::async_trait;
use shopbot_core::error::ToolError;
use shopbot_core::provider::ToolDefinition;
use shopbot_core::tool::{Tool, ToolRegistry, ToolResult};
use std::sync::Arc;

use super::ToolClient;

pub struct McpTool {
    definition: ToolDefinition,
    client: Arc<dyn ToolClient>,
}

impl McpTool {
    pub fn new(definition: ToolDefinition, client: Arc<dyn ToolClient>) -> Self {
        Self { definition, client }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.definition.parameters.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.client.call_tool(&self.definition.name, arguments).await
    }
}

/// Enumerate the client's tools into a fresh registry.
pub async fn registry_from_client(client: Arc<dyn ToolClient>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    for definition in client.list_tools().await? {
        registry.register(Box::new(McpTool::new(definition, client.clone())));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    struct Places;

    #[async_trait]
    impl ToolClient for Places {
        fn name(&self) -> &str {
            "places"
        }

        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
            Ok(vec![
                ToolDefinition {
                    name: "maps_search_places".into(),
                    description: "Search for places".into(),
                    parameters: json!({"type": "object"}),
                },
                ToolDefinition {
                    name: "maps_place_details".into(),
                    description: "Get place details".into(),
                    parameters: json!({"type": "object"}),
                },
            ])
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: format!("{name}:{}", arguments["query"].as_str().unwrap_or("")),
                data: None,
            })
        }

        async fn close(&self) -> Result<(), ToolError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn registry_wraps_every_advertised_tool() {
        let registry = registry_from_client(Arc::new(Places)).await.unwrap();
        assert_eq!(registry.names(), vec!["maps_place_details", "maps_search_places"]);

        let tool = registry.get("maps_search_places").unwrap();
        assert_eq!(tool.description(), "Search for places");
        let out = tool.execute(json!({"query": "渋谷 居酒屋"})).await.unwrap();
        assert_eq!(out.output, "maps_search_places:渋谷 居酒屋");
    }
}
