//! Builds live MCP clients from configuration.

use async_trait::async_trait;
use serde_json::Value;
use shopbot_config::{McpConfig, McpOAuthConfig, McpTransportKind};
use shopbot_core::error::ToolError;
use shopbot_security::SecretProvider;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::client::McpClient;
use super::transport::{HttpTransport, McpTransport, StdioTransport};
use super::{ToolClient, ToolConnector};

/// Name used for the places-search server in logs.
pub const DEFAULT_SERVER_NAME: &str = "google-maps";

pub struct McpConnector {
    server: String,
    config: McpConfig,
    secrets: Arc<SecretProvider>,
    http: reqwest::Client,
}

impl McpConnector {
    pub fn new(config: McpConfig, secrets: Arc<SecretProvider>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            server: DEFAULT_SERVER_NAME.to_string(),
            config,
            secrets,
            http,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    async fn secret(&self, name: &str) -> Result<String, ToolError> {
        self.secrets
            .get_secret(name)
            .await
            .map_err(|e| ToolError::NotConfigured(format!("{name} is required: {e}")))
    }

    /// Client-credentials grant against the configured token endpoint.
    async fn fetch_access_token(&self, oauth: &McpOAuthConfig) -> Result<String, ToolError> {
        let client_secret = self.secret(&oauth.client_secret_secret).await?;

        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = oauth.scope.as_deref() {
            form.push(("scope", scope));
        }

        let response = self
            .http
            .post(&oauth.token_url)
            .basic_auth(&oauth.client_id, Some(&client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| ToolError::Transport(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transport(format!(
                "token endpoint returned HTTP {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Protocol(format!("token response is not JSON: {e}")))?;
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ToolError::Protocol("token response has no access_token".into()))?;

        debug!(server = %self.server, "Fetched tool gateway access token");
        Ok(token.to_string())
    }

    async fn transport(&self) -> Result<Box<dyn McpTransport>, ToolError> {
        match self.config.transport {
            McpTransportKind::Stdio => {
                let api_key = self.secret(&self.config.api_key_secret).await?;
                let env = vec![(self.config.api_key_env.clone(), api_key)];
                let transport = StdioTransport::spawn(
                    &self.server,
                    &self.config.command,
                    &self.config.args,
                    &env,
                    self.timeout(),
                )?;
                Ok(Box::new(transport))
            }
            McpTransportKind::Http => {
                let url = self
                    .config
                    .url
                    .clone()
                    .ok_or_else(|| ToolError::NotConfigured("mcp.url is not set".into()))?;
                let token = match &self.config.oauth {
                    Some(oauth) => Some(self.fetch_access_token(oauth).await?),
                    None => self.config.bearer_token.clone(),
                };
                Ok(Box::new(HttpTransport::new(url, token, self.timeout())))
            }
        }
    }
}

#[async_trait]
impl ToolConnector for McpConnector {
    async fn connect(&self) -> Result<Arc<dyn ToolClient>, ToolError> {
        let transport = self.transport().await?;
        info!(server = %self.server, transport = ?self.config.transport, "Connecting to MCP server");
        let client = McpClient::connect(&self.server, transport).await?;
        Ok(Arc::new(client))
    }
}
