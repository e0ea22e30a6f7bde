//! `shopbot status`: Show the effective configuration.

use shopbot_config::{AgentBackendKind, AppConfig, McpTransportKind};
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_path(config_path);
    let config = super::load_config(config_path)?;

    println!("🛍  shopbot Status");
    println!("==================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!(
        "  Config file:   {} {}",
        path.display(),
        if path.exists() { "" } else { "(not found, using defaults)" }
    );
    println!("  Gateway:       {}:{}", config.gateway.host, config.gateway.port);

    match &config.secrets.ssm_prefix {
        Some(prefix) => println!("  Secrets:       parameter store {prefix} ({})", config.secrets_region()),
        None => println!("  Secrets:       environment"),
    }

    match config.agent.backend {
        AgentBackendKind::Local => {
            println!("  Backend:       local");
            println!("  Provider:      {}", config.agent.provider);
            println!("  Model:         {}", config.agent.model);
            println!("  Refresh after: {}s", config.agent.reinit_every_secs);
            match config.mcp.transport {
                McpTransportKind::Stdio => {
                    println!("  MCP server:    {} {}", config.mcp.command, config.mcp.args.join(" "))
                }
                McpTransportKind::Http => {
                    println!(
                        "  MCP server:    {}",
                        config.mcp.url.as_deref().unwrap_or("(unset)")
                    );
                    let auth = match (&config.mcp.oauth, &config.mcp.bearer_token) {
                        (Some(oauth), _) => format!("client credentials via {}", oauth.token_url),
                        (None, Some(_)) => "static bearer token".to_string(),
                        (None, None) => "none".to_string(),
                    };
                    println!("  MCP auth:      {auth}");
                }
            }
        }
        AgentBackendKind::Hosted => {
            println!("  Backend:       hosted");
            println!(
                "  Runtime:       {}",
                config
                    .agent
                    .runtime_url
                    .as_deref()
                    .or(config.agent.runtime_arn.as_deref())
                    .unwrap_or("(unset)")
            );
        }
    }

    println!("  LINE API:      {}", config.line.api_base);
    println!("  Max text:      {} chars", config.line.max_text_len);
    println!("  Triggers:      {}", config.routing.triggers.join(", "));

    Ok(())
}
