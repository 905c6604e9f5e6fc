mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use reencoder::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            info!("Loading configuration");
            let config = Config::load(args.config)
                .map_err(|e| format!("Failed to load config: {}", e))?;
            reencoder::api::run(config).await?
        }
        Commands::InitConfig(args) => {
            let path = Config::write_defaults(args.config)?;
            info!(path = %path.display(), "Wrote default configuration");
        }
    }

    Ok(())
}
