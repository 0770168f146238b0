//! tzarchiver CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tzarchiver::cli::Cli;
use tzarchiver::config;

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in .env; load before clap reads the environment
    let env_file = config::load_env_file();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    // Parse and execute CLI
    let cli = Cli::parse();
    cli.execute().await
}
