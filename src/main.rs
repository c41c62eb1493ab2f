//! zkSync account sender CLI
//!
//! Deploys a minimal smart-contract account and a test token, then sends a
//! mint transaction from the account, signed off-chain by its owner key.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use zk_account_sender::chain::ChainProvider;
use zk_account_sender::config::Settings;
use zk_account_sender::scripts::{self, ScriptContext};
use zk_account_sender::tx::KeySigner;
use zk_account_sender::verify::{ExplorerVerifier, TokioClock, Verifier};

#[derive(Parser)]
#[command(name = "zk-account-sender")]
#[command(about = "Deploy and drive a zkSync smart-contract account")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Skip source verification even when enabled in config
    #[arg(long, global = true)]
    no_verify: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the minimal account contract
    DeployAccount,

    /// Deploy the mintable test token
    DeployToken,

    /// Send a mint transaction from the minimal account
    SendTx,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Starting zk-account-sender v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(cli.config.as_deref())?;

    let provider = ChainProvider::new(settings.network.clone())?;
    provider.verify_chain_id().await?;

    let signer = KeySigner::from_env(&settings.wallet.private_key_env)
        .context("Failed to load signing key")?;

    let verifier: Option<Arc<dyn Verifier>> = if settings.verification.enabled && !cli.no_verify {
        Some(Arc::new(ExplorerVerifier::from_config(&settings.verification)?))
    } else {
        None
    };

    let ctx = ScriptContext {
        settings,
        oracle: Arc::new(provider),
        signer: Arc::new(signer),
        verifier,
        clock: Arc::new(TokioClock),
    };

    match cli.command {
        Commands::DeployAccount => {
            let deployment = scripts::deploy_account(&ctx).await?;
            info!(
                "{} deployed at {:?} (tx {:?})",
                deployment.contract_name, deployment.address, deployment.tx_hash
            );
        }
        Commands::DeployToken => {
            let deployment = scripts::deploy_token(&ctx).await?;
            info!(
                "{} deployed at {:?} (tx {:?})",
                deployment.contract_name, deployment.address, deployment.tx_hash
            );
        }
        Commands::SendTx => {
            let execution = scripts::send_tx(&ctx).await?;
            info!(
                "Transaction {:?} confirmed in block {:?}",
                execution.confirmation.tx_hash, execution.confirmation.block_number
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,hyper=warn")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,zk_account_sender=debug,hyper=warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
