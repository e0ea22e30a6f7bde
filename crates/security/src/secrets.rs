//! Secret lookup: AWS SSM Parameter Store with an environment fallback.
//!
//! Two modes, chosen by whether a parameter prefix is configured:
//!
//! - **Environment mode** (no prefix): secrets are plain environment
//!   variables. Used for local runs and tests.
//! - **Store mode**: `{prefix}/{name}` is fetched with decryption, cached
//!   for the life of the process, and on any fetch failure the
//!   environment variable of the same name is tried before giving up.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::sigv4::{AwsCredentials, SigV4Signer, SigningError};

/// Errors from secret lookup.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret {0} not found in Parameter Store or environment")]
    NotFound(String),

    #[error("Parameter store request for {name} failed: {reason}")]
    Store { name: String, reason: String },

    #[error("No parameter store configured")]
    NoStore,

    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Where environment-mode values come from.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// A hierarchical key/value store holding encrypted parameters.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Fetch the decrypted value of the parameter at `name` (a full path).
    async fn get_parameter(&self, name: &str) -> Result<String, SecretError>;
}

/// AWS Systems Manager Parameter Store over its JSON 1.1 API.
pub struct SsmParameterStore {
    client: reqwest::Client,
    endpoint: String,
    signer: SigV4Signer,
}

#[derive(Deserialize)]
struct GetParameterResponse {
    #[serde(rename = "Parameter")]
    parameter: SsmParameter,
}

#[derive(Deserialize)]
struct SsmParameter {
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Deserialize)]
struct SsmErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(default, alias = "Message")]
    message: String,
}

impl SsmParameterStore {
    pub fn new(credentials: AwsCredentials, region: impl Into<String>, timeout: Duration) -> Self {
        let region = region.into();
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            endpoint: format!("https://ssm.{region}.amazonaws.com/"),
            signer: SigV4Signer::new(credentials, region, "ssm"),
        }
    }

    /// Point at a different endpoint (VPC endpoint, local fake).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, SecretError> {
        let body = serde_json::json!({ "Name": name, "WithDecryption": true }).to_string();
        let content_type = "application/x-amz-json-1.1";
        let target = "AmazonSSM.GetParameter";

        let auth = self.signer.sign(
            "POST",
            &self.endpoint,
            &[("content-type", content_type), ("x-amz-target", target)],
            body.as_bytes(),
        )?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", content_type)
            .header("x-amz-target", target);
        for (header, value) in &auth {
            request = request.header(header.as_str(), value.as_str());
        }

        let store_err = |reason: String| SecretError::Store {
            name: name.to_string(),
            reason,
        };

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| store_err(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| store_err(e.to_string()))?;

        if !status.is_success() {
            let reason = match serde_json::from_str::<SsmErrorBody>(&text) {
                Ok(err) => format!("{status}: {} {}", err.kind, err.message),
                Err(_) => format!("{status}: {text}"),
            };
            return Err(store_err(reason.trim_end().to_string()));
        }

        let parsed: GetParameterResponse =
            serde_json::from_str(&text).map_err(|e| store_err(format!("invalid response: {e}")))?;
        Ok(parsed.parameter.value)
    }
}

/// Resolves named secrets (channel access token, tool API keys).
pub struct SecretProvider {
    prefix: Option<String>,
    store: Option<Arc<dyn ParameterStore>>,
    env: Arc<dyn EnvSource>,
    use_cache: bool,
    cache: RwLock<HashMap<String, String>>,
}

impl SecretProvider {
    /// Environment mode: every lookup reads `env`.
    pub fn from_env(env: Arc<dyn EnvSource>) -> Self {
        Self {
            prefix: None,
            store: None,
            env,
            use_cache: true,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Store mode under `prefix`. A missing `store` behaves like a store
    /// whose every fetch fails, so lookups fall back to `env`.
    pub fn with_store(
        prefix: impl Into<String>,
        store: Option<Arc<dyn ParameterStore>>,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self {
            prefix: Some(prefix),
            store,
            env,
            use_cache: true,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Build from configuration, reading AWS credentials from the
    /// process environment.
    pub fn from_config(config: &shopbot_config::AppConfig) -> Self {
        let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);
        let provider = match &config.secrets.ssm_prefix {
            None => Self::from_env(env),
            Some(prefix) => {
                let store: Option<Arc<dyn ParameterStore>> = match AwsCredentials::from_env() {
                    Some(creds) => Some(Arc::new(SsmParameterStore::new(
                        creds,
                        config.secrets_region(),
                        Duration::from_secs(config.secrets.fetch_timeout_secs),
                    ))),
                    None => {
                        warn!("SSM prefix is set but no AWS credentials were found; secrets will come from the environment");
                        None
                    }
                };
                Self::with_store(prefix.clone(), store, env)
            }
        };
        provider.with_cache(config.secrets.use_cache)
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Whether lookups go to the parameter store.
    pub fn is_store_mode(&self) -> bool {
        self.prefix.is_some()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Resolve a secret by name.
    pub async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        let Some(prefix) = &self.prefix else {
            return self.env_value(name);
        };

        if self.use_cache {
            if let Some(value) = self.cached(name) {
                return Ok(value);
            }
        }

        let path = format!("{prefix}/{name}");
        let fetched = match &self.store {
            Some(store) => store.get_parameter(&path).await,
            None => Err(SecretError::NoStore),
        };

        match fetched {
            Ok(value) => {
                debug!(secret = %name, "Fetched secret from parameter store");
                if self.use_cache {
                    if let Ok(mut cache) = self.cache.write() {
                        cache.insert(name.to_string(), value.clone());
                    }
                }
                Ok(value)
            }
            Err(e) => {
                error!(secret = %name, error = %e, "Failed to get secret");
                let value = self.env_value(name)?;
                warn!(secret = %name, "Using environment variable fallback");
                Ok(value)
            }
        }
    }

    /// Fetch a parameter by its full path, bypassing the prefix, the
    /// cache and the environment fallback.
    pub async fn get_parameter(&self, path: &str) -> Result<String, SecretError> {
        match &self.store {
            Some(store) => store.get_parameter(path).await,
            None => Err(SecretError::NoStore),
        }
    }

    /// Forget every cached value.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn cached(&self, name: &str) -> Option<String> {
        self.cache.read().ok()?.get(name).cloned()
    }

    fn env_value(&self, name: &str) -> Result<String, SecretError> {
        self.env
            .var(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

impl std::fmt::Debug for SecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretProvider")
            .field("prefix", &self.prefix)
            .field("has_store", &self.store.is_some())
            .field("use_cache", &self.use_cache)
            .finish()
    }
}
