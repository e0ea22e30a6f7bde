//! `shopbot init`: Write a default config file.

use shopbot_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_path(config_path);

    println!("🛍  shopbot Setup");
    println!("===================\n");

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if path.exists() {
        println!("⚠️  Config already exists at: {}", path.display());
        println!("   Edit it manually or delete and re-run init.\n");
        return Ok(());
    }

    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Created config at: {}", path.display());
    println!("\n📝 Next steps:");
    println!("   1. Provide CHANNEL_ACCESS_TOKEN and GOOGLE_MAPS_API_KEY");
    println!("      (MCP_CLIENT_SECRET instead of the maps key for an [mcp.oauth] gateway)");
    println!("      (environment, or SSM_PREFIX for the parameter store)");
    println!("   2. Run: shopbot doctor");
    println!("   3. Run: shopbot serve\n");

    Ok(())
}
