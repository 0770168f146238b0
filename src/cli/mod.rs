//! Command-line interface for tzarchiver.
//!
//! Without a subcommand the tool archives: a specific wallet with `--wallet`,
//! otherwise the whole index via continuous exploration until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{TzktClient, WaybackClient};
use crate::config::{ArchiveCredentials, ArchiverConfig, ACCESS_KEY_ENV, SECRET_KEY_ENV};
use crate::core::{ArchivalAdmission, Orchestrator, StateStore};

/// Account prefixes the index accepts (implicit accounts and originated contracts)
const ADDRESS_PREFIXES: [&str; 4] = ["tz1", "tz2", "tz3", "KT1"];

/// tzarchiver - Archive Tezos NFT artifacts to the Wayback Machine
#[derive(Parser, Debug)]
#[command(name = "tzarchiver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .tzarchiver/config.yaml in this or a parent directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Archive access key
    #[arg(long, env = ACCESS_KEY_ENV, hide_env_values = true)]
    pub access_key: Option<String>,

    /// Archive secret key
    #[arg(long, env = SECRET_KEY_ENV, hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Archive tokens minted, held, or contained by this address
    #[arg(short, long)]
    pub wallet: Option<String>,

    /// Maximum tokens fetched per query in wallet mode
    #[arg(short, long)]
    pub limit: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show archival progress and the exploration cursor
    Status,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = ArchiverConfig::load(self.config.as_deref())?;

        match &self.command {
            Some(Commands::Status) => show_status(&config).await,
            Some(Commands::Config) => show_config(&config),
            None => {
                let credentials = self.credentials()?;
                match &self.wallet {
                    Some(address) => {
                        let limit = self.limit.unwrap_or(config.default_token_limit);
                        validate_wallet(address, limit)?;
                        run_wallet(&config, credentials, address, limit).await
                    }
                    None => run_exploration(&config, credentials).await,
                }
            }
        }
    }

    fn credentials(&self) -> Result<ArchiveCredentials> {
        let access_key = self.access_key.clone().with_context(|| {
            format!(
                "Archive access key required (--access-key, {} or a .env file)",
                ACCESS_KEY_ENV
            )
        })?;
        let secret_key = self.secret_key.clone().with_context(|| {
            format!(
                "Archive secret key required (--secret-key, {} or a .env file)",
                SECRET_KEY_ENV
            )
        })?;
        Ok(ArchiveCredentials::new(access_key, secret_key))
    }
}

/// Reject malformed wallet-mode arguments before any work starts
pub fn validate_wallet(address: &str, limit: usize) -> Result<()> {
    if !ADDRESS_PREFIXES.iter().any(|p| address.starts_with(p)) {
        anyhow::bail!(
            "Invalid address '{}': expected a tz1, tz2, tz3 or KT1 address",
            address
        );
    }
    if limit == 0 {
        anyhow::bail!("Token limit must be at least 1");
    }
    Ok(())
}

/// Wire the clients, state, and gates together
async fn build_orchestrator(
    config: &ArchiverConfig,
    credentials: ArchiveCredentials,
) -> Result<Orchestrator> {
    let index = Arc::new(TzktClient::new(&config.tzkt)?);
    let archive = Arc::new(WaybackClient::new(&config.wayback, credentials)?);
    let state = Arc::new(StateStore::load(&config.data_dir).await);
    info!(data_dir = %config.data_dir.display(), "Using data directory");

    Ok(Orchestrator::new(
        index,
        ArchivalAdmission::new(archive, config),
        state,
        config.exploration.clone(),
    ))
}

/// Archive one wallet and log the final statistics
async fn run_wallet(
    config: &ArchiverConfig,
    credentials: ArchiveCredentials,
    address: &str,
    limit: usize,
) -> Result<()> {
    let orchestrator = build_orchestrator(config, credentials).await?;
    let stats = orchestrator.process_wallet(address, limit).await;
    info!(%stats, "Wallet processing complete");
    Ok(())
}

/// Explore until Ctrl-C
async fn run_exploration(config: &ArchiverConfig, credentials: ArchiveCredentials) -> Result<()> {
    let orchestrator = build_orchestrator(config, credentials).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, finishing submitted jobs (Ctrl-C again to quit now)");
        on_signal.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, exiting without waiting for submitted jobs");
            std::process::exit(130);
        }
    });

    let stats = orchestrator.explore(cancel).await;
    info!(%stats, "Exploration totals");
    Ok(())
}

/// Print persisted progress
async fn show_status(config: &ArchiverConfig) -> Result<()> {
    let state = StateStore::load(&config.data_dir).await;

    println!("Data directory: {}", config.data_dir.display());
    println!("Processed:      {}", state.processed_count().await);
    println!("Errored:        {}", state.errored_count().await);

    match state.cursor().await {
        Some(cursor) => {
            let direction = if cursor.is_positive_direction { "+" } else { "-" };
            println!(
                "Exploration:    seed {}, iteration {}, next step {}",
                cursor.seed, cursor.iteration_count, direction
            );
        }
        None => println!("Exploration:    (not started)"),
    }

    Ok(())
}

/// Print the resolved configuration
fn show_config(config: &ArchiverConfig) -> Result<()> {
    println!(
        "Config file: {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();

    let rendered = serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{}", rendered);

    Ok(())
}
