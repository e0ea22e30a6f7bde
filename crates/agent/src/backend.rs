//! Agent backends: the in-process agent over a warm runtime, and a hosted
//! agent runtime reached over HTTP.

use async_trait::async_trait;
use futures::StreamExt;
use shopbot_core::agent::{AgentBackend, AgentQuery};
use shopbot_core::error::{Error, ProviderError, Result};
use shopbot_security::sigv4::uri_encode;
use shopbot_security::{AwsCredentials, SigV4Signer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::prompt::format_query_prompt;
use crate::runtime::AgentRuntime;

/// Answers queries with the local agent loop bound to the warm tool client.
pub struct LocalAgentBackend {
    runtime: Arc<AgentRuntime>,
}

impl LocalAgentBackend {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<AgentRuntime> {
        &self.runtime
    }
}

#[async_trait]
impl AgentBackend for LocalAgentBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn invoke(&self, query: &AgentQuery) -> Result<String> {
        let agent = self.runtime.agent().await?;
        let prompt = format_query_prompt(&query.text);
        debug!(session = %query.session_id, "Running local agent");
        agent.run(&prompt).await
    }

    async fn reinitialize(&self) -> Result<()> {
        self.runtime.ensure_ready(true).await
    }

    async fn shutdown(&self) {
        self.runtime.shutdown().await;
    }
}

/// Text used when the hosted runtime streams back nothing.
pub const EMPTY_RESPONSE_TEXT: &str = "申し訳ございません。応答を取得できませんでした。";

const AGENTCORE_SERVICE: &str = "bedrock-agentcore";

/// Delegates to an agent hosted on Bedrock AgentCore.
///
/// The runtime owns the tools and the per-user memory, so this side only
/// forwards `{prompt, user_id}` and unwraps the streamed answer.
pub struct HostedRuntimeBackend {
    url: String,
    signer: SigV4Signer,
    client: reqwest::Client,
    empty_response: String,
}

impl HostedRuntimeBackend {
    pub fn new(url: impl Into<String>, signer: SigV4Signer, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            signer,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            empty_response: EMPTY_RESPONSE_TEXT.to_string(),
        }
    }

    /// Build from `[agent]` settings with explicit credentials.
    pub fn from_config(
        config: &shopbot_config::AgentConfig,
        credentials: AwsCredentials,
    ) -> Result<Self> {
        let url = match (&config.runtime_url, &config.runtime_arn) {
            (Some(url), _) => url.clone(),
            (None, Some(arn)) => invocation_url(&config.region, arn),
            (None, None) => {
                return Err(Error::config(
                    "hosted backend requires agent.runtime_arn or agent.runtime_url",
                ));
            }
        };
        let signer = SigV4Signer::new(credentials, config.region.clone(), AGENTCORE_SERVICE);
        info!(url = %url, "Using hosted agent runtime");
        Ok(Self::new(url, signer, Duration::from_secs(config.runtime_timeout_secs)))
    }

    pub fn with_empty_response(mut self, text: impl Into<String>) -> Self {
        self.empty_response = text.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// `InvokeAgentRuntime` endpoint for a runtime ARN.
pub fn invocation_url(region: &str, runtime_arn: &str) -> String {
    format!(
        "https://bedrock-agentcore.{region}.amazonaws.com/runtimes/{}/invocations",
        uri_encode(runtime_arn, true)
    )
}

/// Unwrap `data: "…"` SSE framing into plain text.
///
/// Each `data:` payload is a JSON string; payloads are concatenated in
/// order. A body without SSE framing is returned unchanged.
pub fn unwrap_sse(raw: &str) -> String {
    if !raw.starts_with("data:") {
        return raw.to_string();
    }

    let mut text = String::new();
    for line in raw.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim_start();
        match serde_json::from_str::<String>(payload) {
            Ok(chunk) => text.push_str(&chunk),
            Err(_) => {
                let bare = payload.strip_prefix('"').unwrap_or(payload);
                let bare = bare.strip_suffix('"').unwrap_or(bare);
                text.push_str(&bare.replace("\\n", "\n"));
            }
        }
    }
    text
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string()).into()
    } else {
        ProviderError::Network(e.to_string()).into()
    }
}

#[async_trait]
impl AgentBackend for HostedRuntimeBackend {
    fn name(&self) -> &str {
        "hosted"
    }

    async fn invoke(&self, query: &AgentQuery) -> Result<String> {
        let body = serde_json::json!({
            "prompt": query.text,
            "user_id": query.session_id,
        })
        .to_string();
        let content_type = "application/json";

        let auth = self
            .signer
            .sign("POST", &self.url, &[("content-type", content_type)], body.as_bytes())
            .map_err(|e| Error::config(e.to_string()))?;

        let mut request = self.client.post(&self.url).header("content-type", content_type);
        for (header, value) in &auth {
            request = request.header(header.as_str(), value.as_str());
        }

        debug!(session = %query.session_id, "Invoking hosted agent runtime");
        let response = request.body(body).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Hosted agent runtime error");
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: error_body,
            }
            .into());
        }

        let mut raw = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            raw.extend_from_slice(&chunk.map_err(transport_error)?);
        }

        let text = unwrap_sse(&String::from_utf8_lossy(&raw));
        if text.is_empty() {
            warn!(session = %query.session_id, "Hosted agent runtime returned no text");
            return Ok(self.empty_response.clone());
        }
        Ok(text)
    }
}
