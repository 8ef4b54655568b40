pub mod actions;
pub mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use yds_flow::VaultStore;
use yds_flow::config::RuntimeConfig;
use yds_flow::ledger::evm::{EvmLedger, RpcWalletSession};
use yds_flow::liveness::LivenessProbe;

use crate::cli::{Cli, Command};

/// Entry point for every subcommand.
pub async fn run(cli: Cli) -> Result<()> {
    let config_args = cli.connection.config_args();

    // Probing needs no address book.
    if let Command::Probe = cli.command {
        return status::probe(&config_args.rpc_url, config_args.chain_id).await;
    }

    let config = RuntimeConfig::from_cli(&config_args)?;
    let store = connect(&config)?;

    match cli.command {
        Command::Status { json } => status::status(&store, json).await,
        Command::Watch => status::watch(&store, &config).await,
        Command::Probe => Ok(()),
        Command::Network => status::network(&store).await,
        Command::Mint { amount } => actions::mint(&store, &amount).await,
        Command::Deposit { amount, no_approve } => actions::deposit(&store, &amount, no_approve).await,
        Command::Withdraw { amount } => actions::withdraw(&store, &amount).await,
        Command::Redeem { shares } => actions::redeem(&store, &shares).await,
        Command::RedeemAssets { amount } => actions::redeem_assets(&store, &amount).await,
        Command::Harvest => actions::harvest(&store).await,
        Command::SimulateYield { amount } => actions::simulate_yield(&store, amount.as_deref()).await,
        Command::Switch => actions::switch(&store).await,
    }
}

fn connect(config: &RuntimeConfig) -> Result<VaultStore> {
    let ledger = EvmLedger::connect(&config.chain, config.private_key.as_deref())
        .context("connecting to the RPC endpoint")?;
    let wallet = RpcWalletSession::connect(config.wallet_rpc_url())
        .context("connecting to the wallet endpoint")?;
    let probe = LivenessProbe::new(config.chain.rpc_url())?;

    println!("=== yds-flow ===");
    println!("RPC:     {} (chain {})", config.chain.rpc_url(), config.chain.chain_id());
    if config.wallet_rpc_url.is_some() {
        println!("Wallet:  {}", config.wallet_rpc_url());
    }
    println!("Vault:   {}", config.addresses.vault);
    match config.account {
        Some(account) => println!("Account: {account}"),
        None => println!("Account: none (read-only, set YDS_PRIVATE_KEY to sign)"),
    }
    println!();

    Ok(VaultStore::new(Arc::new(ledger), Arc::new(wallet), config).with_liveness_probe(probe))
}
