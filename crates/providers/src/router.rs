//! Provider selection from configuration.

use shopbot_core::error::ProviderError;
use shopbot_core::provider::Provider;
use shopbot_security::{AwsCredentials, SigV4Signer};
use std::sync::Arc;
use tracing::info;

use crate::anthropic::AnthropicProvider;

/// Build the configured model provider, reading AWS credentials from the
/// process environment when Bedrock is selected.
pub fn build_from_config(
    config: &shopbot_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    build_with_credentials(config, AwsCredentials::from_env())
}

/// Like [`build_from_config`] with explicit credentials.
pub fn build_with_credentials(
    config: &shopbot_config::AppConfig,
    credentials: Option<AwsCredentials>,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let agent = &config.agent;

    let provider = match agent.provider.as_str() {
        "bedrock" => {
            let credentials = credentials.ok_or_else(|| {
                ProviderError::NotConfigured(
                    "bedrock requires AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".into(),
                )
            })?;
            let signer = SigV4Signer::new(credentials, agent.region.clone(), "bedrock");
            AnthropicProvider::bedrock(signer)
        }
        "anthropic" => {
            let api_key = agent.api_key.clone().ok_or_else(|| {
                ProviderError::NotConfigured("anthropic requires agent.api_key or ANTHROPIC_API_KEY".into())
            })?;
            AnthropicProvider::new(api_key)
        }
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown provider '{other}' (expected \"bedrock\" or \"anthropic\")"
            )));
        }
    };

    let provider = match &agent.api_url {
        Some(url) => provider.with_base_url(url),
        None => provider,
    };

    info!(provider = %agent.provider, model = %agent.model, "Model provider ready");
    Ok(Arc::new(provider))
}
