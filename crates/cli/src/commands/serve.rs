//! `shopbot serve`: Start the webhook server.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🛍  shopbot");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Backend:   {:?}", config.agent.backend);
    println!("   Webhook:   POST /webhook  (proxy envelope: POST /lambda)");

    shopbot_gateway::start(config).await?;

    Ok(())
}
