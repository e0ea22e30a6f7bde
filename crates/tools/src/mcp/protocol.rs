//! JSON-RPC 2.0 message shapes for the Model Context Protocol.

use serde_json::{Value, json};
use shopbot_core::error::ToolError;
use shopbot_core::provider::ToolDefinition;
use shopbot_core::tool::ToolResult;
use tracing::debug;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

pub fn notification(method: &str) -> Value {
    json!({ "jsonrpc": "2.0", "method": method })
}

pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": client_name, "version": client_version }
    })
}

/// What to do with one incoming message while awaiting response `id`.
#[derive(Debug)]
pub enum Incoming {
    /// The response we are waiting for
    Response(Value),
    /// A notification or server-initiated request; keep reading
    Skip,
}

/// Classify a message read while waiting for the response to `expected`.
///
/// Ids are issued in increasing order, so a lower id is a late answer to a
/// request that already timed out and is dropped.
pub fn classify(message: Value, expected: u64) -> Result<Incoming, ToolError> {
    let Some(id) = message.get("id") else {
        return Ok(Incoming::Skip);
    };
    if message.get("method").is_some() {
        // Server-to-client request (e.g. ping); not ours to answer here.
        return Ok(Incoming::Skip);
    }
    match id.as_u64() {
        Some(got) if got == expected => Ok(Incoming::Response(message)),
        Some(got) if got < expected => {
            debug!(got, expected, "Dropping late response");
            Ok(Incoming::Skip)
        }
        Some(got) => Err(ToolError::Protocol(format!(
            "response id mismatch (expected {expected}, got {got})"
        ))),
        None => Err(ToolError::Protocol(format!("unexpected response id {id}"))),
    }
}

/// Extract `result` from a response, turning JSON-RPC errors into `ToolError`.
pub fn into_result(response: Value) -> Result<Value, ToolError> {
    if let Some(err) = response.get("error") {
        let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        let msg = err.get("message").and_then(|m| m.as_str()).unwrap_or("unknown");
        return Err(ToolError::Rejected(format!("error {code}: {msg}")));
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| ToolError::Protocol("response missing 'result'".into()))
}

/// Parse a `tools/list` result.
pub fn parse_tool_list(result: &Value) -> Result<Vec<ToolDefinition>, ToolError> {
    let tools = result
        .get("tools")
        .and_then(|t| t.as_array())
        .ok_or_else(|| ToolError::Protocol("tools/list result missing 'tools'".into()))?;

    tools
        .iter()
        .map(|tool| {
            let name = tool
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::Protocol("tool without a name".into()))?;
            Ok(ToolDefinition {
                name: name.to_string(),
                description: tool
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                parameters: tool
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
            })
        })
        .collect()
}

/// Convert a `tools/call` result into a `ToolResult`.
///
/// All `text` content items are joined with newlines. A result without any
/// text part is rendered as JSON so the model still sees something.
pub fn parse_call_result(result: Value) -> ToolResult {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let output = if texts.is_empty() {
        serde_json::to_string_pretty(&result).unwrap_or_default()
    } else {
        texts.join("\n")
    };
    let is_error = result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);

    ToolResult {
        call_id: String::new(),
        success: !is_error,
        output,
        data: Some(result),
    }
}
