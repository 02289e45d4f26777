//! B52 Bridge Node
//!
//! Hosts the bridge ledger behind an HTTP API and relays source-chain deposits to it.
//!
//! # Commands
//!
//! - `serve` - run the ledger and its API (`/b52/bridge/v1/...`, `/health`, `/metrics`)
//! - `process-deposit <index>` - submit `ProcessDeposit` to a running node
//! - `deposit-status <identifier>` - query whether an identifier was minted
//! - `deposit-id <index>` - print the deterministic identifier of a deposit index
//! - `relay` - poll `Deposited` logs and submit every new deposit to the node

use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use tracing::info;

use bridge::hash::deterministic_identifier;
use bridge::msg::InstantiateMsg;
use node::app::BridgeApp;
use node::client::NodeClient;
use node::config::Config;
use node::evm_client::EvmSourceClient;
use node::relayer::{DepositRelayer, NodeSubmitter};
use node::server::{start_server, AppState};

#[derive(Parser)]
#[command(name = "b52-bridge")]
#[command(about = "B52 bridge node and CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge ledger and its HTTP API
    Serve,

    /// Submit a deposit for processing
    ProcessDeposit {
        deposit_index: u64,

        /// Source block to read the deposit at (default: pinned height, then latest)
        #[arg(long)]
        eth_block_height: Option<u64>,

        /// Signer address (default: RELAYER_CREATOR, then BRIDGE_AUTHORITY)
        #[arg(long)]
        creator: Option<String>,
    },

    /// Check whether a source identifier has been minted
    DepositStatus { identifier: String },

    /// Print the deterministic identifier of a deposit index
    DepositId {
        deposit_index: u64,

        /// Deposit contract (default: DEPOSIT_CONTRACT_ADDRESS)
        #[arg(long)]
        contract: Option<String>,
    },

    /// Relay new source-chain deposits to the node
    Relay,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::load()?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::ProcessDeposit {
            deposit_index,
            eth_block_height,
            creator,
        } => {
            let creator = creator
                .or_else(|| config.relayer.creator.clone())
                .or_else(|| config.authority.clone())
                .ok_or_else(|| eyre!("--creator, RELAYER_CREATOR or BRIDGE_AUTHORITY required"))?;
            let client = NodeClient::new(&config.node_url)?;
            let res = client
                .process_deposit(&creator, deposit_index, eth_block_height)
                .await?;
            println!("{}", serde_json::to_string_pretty(&res)?);
            Ok(())
        }
        Commands::DepositStatus { identifier } => {
            let client = NodeClient::new(&config.node_url)?;
            let processed = client.is_tx_processed(&identifier).await?;
            println!("{}", serde_json::json!({ "processed": processed }));
            Ok(())
        }
        Commands::DepositId {
            deposit_index,
            contract,
        } => {
            let contract = contract.unwrap_or(config.deposit_contract);
            println!("{}", deterministic_identifier(&contract, deposit_index));
            Ok(())
        }
        Commands::Relay => relay(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting B52 bridge node");
    info!(?config, "Configuration loaded");

    let source = Arc::new(EvmSourceClient::new(config.rpc_url()?)?);
    let app = BridgeApp::new(
        source,
        config.rpc_timeout(),
        InstantiateMsg {
            authority: config.bridge_authority()?.to_string(),
            deposit_contract: config.deposit_contract.clone(),
            denom: Some(config.denom.clone()),
            module_account: Some(config.module_account.clone()),
            address_prefix: Some(config.address_prefix.clone()),
        },
    )
    .wrap_err("Failed to instantiate bridge")?;

    let state = AppState::new(Arc::new(app)).await;
    start_server(
        &config.api_bind_address,
        config.api_port,
        state,
        wait_for_shutdown_signal(),
    )
    .await?;

    info!("B52 bridge node stopped");
    Ok(())
}

async fn relay(config: Config) -> Result<()> {
    info!("Starting B52 deposit relayer");
    info!(?config, "Configuration loaded");

    let creator = config
        .relayer
        .creator
        .clone()
        .ok_or_else(|| eyre!("RELAYER_CREATOR required"))?;
    let source = Arc::new(EvmSourceClient::new(config.rpc_url()?)?);
    let submitter = NodeSubmitter::new(NodeClient::new(&config.node_url)?, creator);
    let mut relayer = DepositRelayer::new(
        source,
        submitter,
        config.deposit_contract.clone(),
        config.relayer.clone(),
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle signals
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    relayer.run(shutdown_rx).await?;

    info!("B52 deposit relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,b52_bridge=debug,bridge=debug,node=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
