//! Configuration loading, validation, and management for shopbot.
//!
//! Loads configuration from `~/.shopbot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.shopbot/config.toml`. Every section is optional;
/// an empty file yields the production defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messaging platform delivery settings
    #[serde(default)]
    pub line: LineConfig,

    /// Where secrets come from
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Tool server connection
    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    /// Which messages are treated as queries
    #[serde(default)]
    pub routing: RoutingConfig,

    /// User-facing fixed texts
    #[serde(default)]
    pub messages: MessagesConfig,
}

fn default_true() -> bool {
    true
}

// --- gateway ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// --- line ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// Messaging API base URL (overridable for tests and proxies)
    #[serde(default = "default_line_api_base")]
    pub api_base: String,

    /// Outbound text cap in characters
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,

    #[serde(default = "default_line_timeout")]
    pub timeout_secs: u64,

    /// Secret name holding the channel access token
    #[serde(default = "default_access_token_secret")]
    pub access_token_secret: String,

    /// Secret name holding the channel secret. When set, `/webhook`
    /// rejects deliveries whose `X-Line-Signature` does not match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_secret_name: Option<String>,
}

fn default_line_api_base() -> String {
    "https://api.line.me".into()
}
fn default_max_text_len() -> usize {
    4500
}
fn default_line_timeout() -> u64 {
    10
}
fn default_access_token_secret() -> String {
    "CHANNEL_ACCESS_TOKEN".into()
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            api_base: default_line_api_base(),
            max_text_len: default_max_text_len(),
            timeout_secs: default_line_timeout(),
            access_token_secret: default_access_token_secret(),
            channel_secret_name: None,
        }
    }
}

// --- secrets ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Parameter store path prefix (e.g. "/line-shop-bot/dev").
    /// Unset means secrets are read straight from the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssm_prefix: Option<String>,

    /// Cache fetched values for the life of the process
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// AWS region for the parameter store (falls back to `agent.region`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            ssm_prefix: None,
            use_cache: true,
            region: None,
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

// --- mcp ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    /// Spawn the tool server as a child process
    Stdio,
    /// Talk to a remote MCP endpoint over streamable HTTP
    Http,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_mcp_transport")]
    pub transport: McpTransportKind,

    #[serde(default = "default_mcp_command")]
    pub command: String,

    #[serde(default = "default_mcp_args")]
    pub args: Vec<String>,

    /// Secret name of the tool server's API key
    #[serde(default = "default_api_key_secret")]
    pub api_key_secret: String,

    /// Environment variable the key is injected as in the child process
    #[serde(default = "default_api_key_secret")]
    pub api_key_env: String,

    /// Endpoint for the HTTP transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bearer token for the HTTP transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Client-credentials grant for the HTTP transport; takes precedence
    /// over `bearer_token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<McpOAuthConfig>,

    #[serde(default = "default_mcp_timeout")]
    pub request_timeout_secs: u64,
}

/// OAuth2 client-credentials settings for a gateway-fronted tool server.
/// A fresh access token is requested on every connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpOAuthConfig {
    pub token_url: String,

    pub client_id: String,

    /// Secret name of the client secret
    #[serde(default = "default_client_secret_secret")]
    pub client_secret_secret: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_mcp_transport() -> McpTransportKind {
    McpTransportKind::Stdio
}
fn default_mcp_command() -> String {
    "node".into()
}
fn default_mcp_args() -> Vec<String> {
    vec!["/var/task/node_modules/@modelcontextprotocol/server-google-maps/dist/index.js".into()]
}
fn default_api_key_secret() -> String {
    "GOOGLE_MAPS_API_KEY".into()
}
fn default_mcp_timeout() -> u64 {
    30
}
fn default_client_secret_secret() -> String {
    "MCP_CLIENT_SECRET".into()
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            transport: default_mcp_transport(),
            command: default_mcp_command(),
            args: default_mcp_args(),
            api_key_secret: default_api_key_secret(),
            api_key_env: default_api_key_secret(),
            url: None,
            bearer_token: None,
            oauth: None,
            request_timeout_secs: default_mcp_timeout(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for McpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConfig")
            .field("transport", &self.transport)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("api_key_secret", &self.api_key_secret)
            .field("api_key_env", &self.api_key_env)
            .field("url", &self.url)
            .field("bearer_token", &redact(&self.bearer_token))
            .field("oauth", &self.oauth)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

// --- agent ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentBackendKind {
    /// In-process agent loop with a warm tool connection
    Local,
    /// Remote hosted agent runtime
    Hosted,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_backend")]
    pub backend: AgentBackendKind,

    /// "bedrock" or "anthropic"
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on model calls per query
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Age after which the warm tool connection is rebuilt
    #[serde(default = "default_reinit_every_secs")]
    pub reinit_every_secs: u64,

    #[serde(default = "default_region")]
    pub region: String,

    /// Anthropic API key (direct provider only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override for the provider endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Parameter name holding a replacement system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_param: Option<String>,

    /// Hosted runtime ARN (hosted backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_arn: Option<String>,

    /// Override for the hosted runtime endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_url: Option<String>,

    #[serde(default = "default_runtime_timeout")]
    pub runtime_timeout_secs: u64,
}

fn default_backend() -> AgentBackendKind {
    AgentBackendKind::Local
}
fn default_provider() -> String {
    "bedrock".into()
}
fn default_model() -> String {
    "global.anthropic.claude-sonnet-4-5-20250929-v1:0".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_iterations() -> u32 {
    8
}
fn default_reinit_every_secs() -> u64 {
    900
}
fn default_region() -> String {
    "ap-northeast-1".into()
}
fn default_runtime_timeout() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            reinit_every_secs: default_reinit_every_secs(),
            region: default_region(),
            api_key: None,
            api_url: None,
            system_prompt_param: None,
            runtime_arn: None,
            runtime_url: None,
            runtime_timeout_secs: default_runtime_timeout(),
        }
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("backend", &self.backend)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_iterations", &self.max_iterations)
            .field("reinit_every_secs", &self.reinit_every_secs)
            .field("region", &self.region)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("system_prompt_param", &self.system_prompt_param)
            .field("runtime_arn", &self.runtime_arn)
            .field("runtime_url", &self.runtime_url)
            .field("runtime_timeout_secs", &self.runtime_timeout_secs)
            .finish()
    }
}

// --- routing ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Prefixes that mark a group/room message as a query
    #[serde(default = "default_triggers")]
    pub triggers: Vec<String>,
}

fn default_triggers() -> Vec<String> {
    vec!["@お店".into(), "＠お店".into()]
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            triggers: default_triggers(),
        }
    }
}

// --- messages ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_ack")]
    pub ack: String,

    #[serde(default = "default_apology")]
    pub apology: String,

    #[serde(default = "default_usage_direct")]
    pub usage_direct: String,

    #[serde(default = "default_usage_group")]
    pub usage_group: String,

    /// Sent when the hosted runtime answers with nothing
    #[serde(default = "default_empty_response")]
    pub empty_response: String,
}

fn default_ack() -> String {
    "ただいま条件に合うお店をお探ししております。検索結果のご案内まで、少々お待ちください。".into()
}
fn default_apology() -> String {
    "申し訳ございません。現在検索サービスに接続できません。少し時間をおいて再度お試しください。".into()
}
fn default_usage_direct() -> String {
    "条件を教えてください。\n例）上野で静かなカフェ\n例）渋谷でデート向き居酒屋".into()
}
fn default_usage_group() -> String {
    "使い方：@お店 の後に条件を書いてね。\n例）@お店 上野で静かなカフェ\n例）@お店 渋谷でデート向き居酒屋"
        .into()
}
fn default_empty_response() -> String {
    "申し訳ございません。応答を取得できませんでした。".into()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            ack: default_ack(),
            apology: default_apology(),
            usage_direct: default_usage_direct(),
            usage_group: default_usage_group(),
            empty_response: default_empty_response(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.shopbot/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path` and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`:
    ///
    /// - `SSM_PREFIX` → `secrets.ssm_prefix` (empty clears it)
    /// - `REINIT_EVERY_SEC` → `agent.reinit_every_secs`
    /// - `LINE_MAX_TEXT_LEN` → `line.max_text_len`
    /// - `SHOPBOT_PROVIDER` / `SHOPBOT_MODEL` → `agent.provider` / `agent.model`
    /// - `AWS_REGION` → `agent.region`
    /// - `ANTHROPIC_API_KEY` → `agent.api_key` when unset
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup("SSM_PREFIX") {
            let prefix = prefix.trim().to_string();
            self.secrets.ssm_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        }

        if let Some(raw) = lookup("REINIT_EVERY_SEC") {
            self.agent.reinit_every_secs = parse_env("REINIT_EVERY_SEC", &raw)?;
        }

        if let Some(raw) = lookup("LINE_MAX_TEXT_LEN") {
            self.line.max_text_len = parse_env("LINE_MAX_TEXT_LEN", &raw)?;
        }

        if let Some(provider) = lookup("SHOPBOT_PROVIDER") {
            self.agent.provider = provider;
        }

        if let Some(model) = lookup("SHOPBOT_MODEL") {
            self.agent.model = model;
        }

        if let Some(region) = lookup("AWS_REGION") {
            self.agent.region = region;
        }

        if self.agent.api_key.is_none() {
            self.agent.api_key = lookup("ANTHROPIC_API_KEY");
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".shopbot")
    }

    /// Region used for the parameter store.
    pub fn secrets_region(&self) -> &str {
        self.secrets.region.as_deref().unwrap_or(&self.agent.region)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.temperature < 0.0 || self.agent.temperature > 1.0 {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 1.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if self.line.max_text_len == 0 {
            return Err(ConfigError::ValidationError(
                "line.max_text_len must be > 0".into(),
            ));
        }

        if self.routing.triggers.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "routing.triggers must not contain empty strings".into(),
            ));
        }

        if self.mcp.transport == McpTransportKind::Http && self.mcp.url.is_none() {
            return Err(ConfigError::ValidationError(
                "mcp.url is required when mcp.transport = \"http\"".into(),
            ));
        }

        if self
            .mcp
            .oauth
            .as_ref()
            .is_some_and(|o| o.token_url.trim().is_empty() || o.client_id.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "mcp.oauth needs token_url and client_id".into(),
            ));
        }

        if self.agent.backend == AgentBackendKind::Hosted
            && self.agent.runtime_arn.is_none()
            && self.agent.runtime_url.is_none()
        {
            return Err(ConfigError::ValidationError(
                "agent.runtime_arn or agent.runtime_url is required for the hosted backend".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} must be a non-negative integer, got {raw:?}")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
