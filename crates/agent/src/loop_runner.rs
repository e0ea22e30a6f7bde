//! The agent reasoning loop implementation.

use shopbot_core::error::Result;
use shopbot_core::message::{Conversation, Message};
use shopbot_core::provider::{Provider, ProviderRequest};
use shopbot_core::tool::{ToolCall, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Returned when the model keeps calling tools past the iteration limit.
pub const ITERATION_LIMIT_TEXT: &str =
    "検索に時間がかかりすぎたため、結果をまとめられませんでした。条件を絞ってもう一度お試しください。";

/// Orchestrates model calls and tool execution for one prompt at a time.
pub struct AgentLoop {
    /// The model provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tools advertised by the tool server
    tools: Arc<ToolRegistry>,

    system_prompt: String,

    /// Maximum tool call iterations per prompt
    max_iterations: u32,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            system_prompt: system_prompt.into(),
            max_iterations: 8,
        }
    }

    /// Set the maximum number of tool call iterations.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answer a single prompt in a fresh conversation.
    pub async fn run(&self, prompt: &str) -> Result<String> {
        let mut conversation = Conversation::with_system(&self.system_prompt);
        conversation.push(Message::user(prompt));
        self.process(&mut conversation).await
    }

    /// Drive the conversation until the model answers with text only.
    ///
    /// Failed calls (bad arguments, unknown tool, `isError` results) are
    /// reported back to the model as tool results. A broken tool-server
    /// connection and provider failures end the run with an error.
    pub async fn process(&self, conversation: &mut Conversation) -> Result<String> {
        let tool_defs = self.tools.definitions();

        for iteration in 0..self.max_iterations {
            debug!(iteration, model = %self.model, "Agent loop iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_defs.clone(),
            };

            let response = self.provider.complete(request).await?;

            if let Some(usage) = &response.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Model usage"
                );
            }

            let assistant_msg = response.message;

            if assistant_msg.tool_calls.is_empty() {
                let content = assistant_msg.content.clone();
                conversation.push(assistant_msg);
                info!(iterations = iteration + 1, chars = content.chars().count(), "Agent answered");
                return Ok(content);
            }

            let tool_calls = assistant_msg.tool_calls.clone();
            conversation.push(assistant_msg);

            for tc in &tool_calls {
                info!(tool = %tc.name, call_id = %tc.id, "Executing tool");

                let arguments = match serde_json::from_str(&tc.arguments) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Unparseable tool arguments");
                        serde_json::Value::Object(Default::default())
                    }
                };

                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments,
                };

                let start = std::time::Instant::now();
                let outcome = self.tools.execute(&call).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match outcome {
                    Ok(result) => {
                        debug!(tool = %tc.name, success = result.success, duration_ms, "Tool finished");
                        let output = if result.success {
                            result.output
                        } else {
                            format!("Error: {}", result.output)
                        };
                        conversation.push(Message::tool_result(&tc.id, output));
                    }
                    Err(e) if e.is_connection_failure() => {
                        warn!(tool = %tc.name, error = %e, duration_ms, "Tool server connection failed");
                        return Err(e.into());
                    }
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, duration_ms, "Tool execution failed");
                        conversation.push(Message::tool_result(&tc.id, format!("Error: {e}")));
                    }
                }
            }
        }

        warn!(max_iterations = self.max_iterations, "Agent hit the tool iteration limit");
        Ok(ITERATION_LIMIT_TEXT.into())
    }
}
