// src/main.rs
//! Address Vault Server Entry Point
//! This binary is responsible for starting the API server.
use address_vault::api::server::VaultServer;
use address_vault::core::config::VaultConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "address_vault")]
#[command(about = "Token-gated HD receiving-address service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Server {
        /// Port to bind the server to
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging()?;

    info!("Starting Address Vault v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config.toml: {}. Using default configuration", e);
        VaultConfig::default()
    });

    // DATABASE_URL overrides whatever the config file says
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        config.storage.database_url = database_url;
    }

    match args.command {
        Some(Commands::Server { port }) => {
            if let Some(port) = port {
                config.server.port = port;
            }
        }
        None => {
            info!("No command specified, starting server on port {}", config.server.port);
        }
    }

    let server = VaultServer::new(config).await?;
    server.start().await
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,h2=info"));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load service configuration from config.toml
fn load_config() -> Result<VaultConfig> {
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config_content = fs::read_to_string(&config_path)?;
    let config: VaultConfig = toml::from_str(&config_content)?;
    Ok(config)
}
