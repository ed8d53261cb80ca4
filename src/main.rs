use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use volume::config::Config;
use volume::server::Server;

/// Book review backend with a resilient book-catalog client
#[derive(Debug, Parser)]
#[command(name = "volume", version, about)]
struct Cli {
    /// Address to bind, overrides BIND_ADDR
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log level, overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration from environment
    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("volume={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting volume service");
    tracing::info!(
        "Configuration: bind_address={}, catalog_base_url={}, api_key_enabled={}",
        config.bind_addr,
        config.catalog_base_url,
        config.effective_api_key().is_some()
    );

    // Create and run the server
    let server = Server::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
