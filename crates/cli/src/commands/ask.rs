//! `shopbot ask`: One query, straight to the agent backend.

use shopbot_core::agent::AgentQuery;
use shopbot_security::SecretProvider;
use std::path::Path;
use std::sync::Arc;

pub async fn run(
    config_path: Option<&Path>,
    message: String,
    session: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let secrets = Arc::new(SecretProvider::from_config(&config));
    let backend = shopbot_agent::build_backend(&config, secrets).await?;

    let query = AgentQuery::new(message.trim(), session);
    if query.text.is_empty() {
        return Err("message must not be empty".into());
    }

    eprint!("  Searching...");
    let answer = backend.invoke(&query).await;
    eprint!("\r              \r");
    backend.shutdown().await;

    println!("{}", answer?);
    Ok(())
}
