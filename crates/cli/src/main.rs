//! shopbot CLI: the main entry point.
//!
//! Commands:
//! - `serve`  : Start the LINE webhook server
//! - `ask`    : Send one query straight to the agent backend
//! - `tools`  : List the tools advertised by the MCP server
//! - `status` : Show the effective configuration
//! - `doctor` : Check secrets, credentials and the tool server
//! - `init`   : Write a default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "shopbot",
    about = "shopbot: LINE shop-search assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "SHOPBOT_JSON_LOGS")]
    json_logs: bool,

    /// Config file (defaults to ~/.shopbot/config.toml)
    #[arg(short, long, global = true, env = "SHOPBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask the agent a single question
    Ask {
        /// The query, e.g. "上野で静かなカフェ"
        #[arg(short, long)]
        message: String,

        /// Session key passed to the hosted backend
        #[arg(short, long, default_value = "cli")]
        session: String,
    },

    /// List tools advertised by the MCP server
    Tools,

    /// Show the effective configuration
    Status,

    /// Diagnose secrets, credentials and the tool server
    Doctor,

    /// Write a default config file
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Ask { message, session } => {
            commands::ask::run(config_path, message, session).await?
        }
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Status => commands::status::run(config_path).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
        Commands::Init => commands::init::run(config_path).await?,
    }

    Ok(())
}
