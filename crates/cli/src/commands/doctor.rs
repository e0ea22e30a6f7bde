//! `shopbot doctor`: Diagnose secrets, credentials and the tool server.

use shopbot_config::AgentBackendKind;
use shopbot_security::{AwsCredentials, SecretProvider};
use shopbot_tools::{McpConnector, ToolConnector};
use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 shopbot Doctor");
    println!("=================\n");

    let mut issues = 0;

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            println!("\n  ⚠️  Fix the config first. Run `shopbot init` for a template.");
            return Ok(());
        }
    };

    let has_aws = AwsCredentials::from_env().is_some();
    let secrets = Arc::new(SecretProvider::from_config(&config));

    if secrets.is_store_mode() {
        if has_aws {
            println!("  ✅ Parameter store mode, AWS credentials present");
        } else {
            println!("  ⚠️  SSM_PREFIX is set but no AWS credentials; environment fallback only");
            issues += 1;
        }
    } else {
        println!("  ✅ Secrets read from the environment");
    }

    let token_name = &config.line.access_token_secret;
    match secrets.get_secret(token_name).await {
        Ok(_) => println!("  ✅ {token_name} resolved"),
        Err(e) => {
            println!("  ❌ {token_name}: {e}");
            issues += 1;
        }
    }

    if let Some(name) = &config.line.channel_secret_name {
        match secrets.get_secret(name).await {
            Ok(_) => println!("  ✅ {name} resolved (signature checks on)"),
            Err(e) => {
                println!("  ❌ {name}: {e}");
                issues += 1;
            }
        }
    }

    match config.agent.backend {
        AgentBackendKind::Local => {
            match shopbot_providers::build_from_config(&config) {
                Ok(provider) => println!("  ✅ Provider '{}' ready", provider.name()),
                Err(e) => {
                    println!("  ❌ Provider '{}': {e}", config.agent.provider);
                    issues += 1;
                }
            }

            let connector = McpConnector::new(config.mcp.clone(), secrets.clone());
            match connector.connect().await {
                Ok(client) => {
                    match client.list_tools().await {
                        Ok(tools) => println!("  ✅ MCP server up, {} tool(s)", tools.len()),
                        Err(e) => {
                            println!("  ❌ MCP tools/list failed: {e}");
                            issues += 1;
                        }
                    }
                    if let Err(e) = client.close().await {
                        tracing::debug!(error = %e, "MCP close failed");
                    }
                }
                Err(e) => {
                    println!("  ❌ MCP server: {e}");
                    issues += 1;
                }
            }
        }
        AgentBackendKind::Hosted => {
            if has_aws {
                println!("  ✅ AWS credentials present for the hosted runtime");
            } else {
                println!("  ❌ Hosted backend needs AWS credentials");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
