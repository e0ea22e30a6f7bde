//! The shop-search agent.
//!
//! A query is answered by one of two backends:
//!
//! 1. **Local**: an [`AgentLoop`] bound to the tools of a warm MCP client.
//!    The loop sends the prompt to the model, executes any tool calls it
//!    requests against the tool server, feeds the results back and repeats
//!    until the model answers with text. The [`AgentRuntime`] keeps the
//!    client and loop alive between requests and rebuilds them when stale.
//! 2. **Hosted**: the query is forwarded to an agent running on Bedrock
//!    AgentCore, which owns its own tools and memory.

pub mod backend;
pub mod loop_runner;
pub mod prompt;
pub mod runtime;

pub use backend::{HostedRuntimeBackend, LocalAgentBackend, unwrap_sse};
pub use loop_runner::AgentLoop;
pub use prompt::{SYSTEM_PROMPT, format_query_prompt, resolve_system_prompt};
pub use runtime::{AgentRuntime, LoopSettings, RuntimeStatus};

use shopbot_config::{AgentBackendKind, AppConfig};
use shopbot_core::agent::AgentBackend;
use shopbot_core::error::{Error, Result};
use shopbot_security::{AwsCredentials, SecretProvider};
use shopbot_tools::McpConnector;
use std::sync::Arc;
use std::time::Duration;

/// Build the local runtime: model provider, MCP connector and loop settings.
/// Nothing is connected until the first `ensure_ready`.
pub async fn build_runtime(
    config: &AppConfig,
    secrets: Arc<SecretProvider>,
) -> Result<Arc<AgentRuntime>> {
    let provider = shopbot_providers::build_from_config(config)?;
    let system_prompt =
        resolve_system_prompt(&secrets, config.agent.system_prompt_param.as_deref()).await;
    let connector = Arc::new(McpConnector::new(config.mcp.clone(), secrets));
    let settings = LoopSettings::from_config(&config.agent).with_system_prompt(system_prompt);

    let runtime = AgentRuntime::new(connector, provider, settings)
        .with_refresh_after(Duration::from_secs(config.agent.reinit_every_secs));
    Ok(Arc::new(runtime))
}

/// Build the backend selected by `agent.backend`.
pub async fn build_backend(
    config: &AppConfig,
    secrets: Arc<SecretProvider>,
) -> Result<Arc<dyn AgentBackend>> {
    match config.agent.backend {
        AgentBackendKind::Local => {
            let runtime = build_runtime(config, secrets).await?;
            Ok(Arc::new(LocalAgentBackend::new(runtime)))
        }
        AgentBackendKind::Hosted => {
            let credentials = AwsCredentials::from_env().ok_or_else(|| {
                Error::config("hosted backend requires AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY")
            })?;
            let backend = HostedRuntimeBackend::from_config(&config.agent, credentials)?
                .with_empty_response(config.messages.empty_response.clone());
            Ok(Arc::new(backend))
        }
    }
}
