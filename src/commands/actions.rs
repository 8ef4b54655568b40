use alloy::primitives::TxHash;
use anyhow::{Context, Result};
use yds_flow::{VaultError, VaultStore};
use yds_flow::model::operation::OperationKind;

use super::status::show;

pub async fn mint(store: &VaultStore, amount: &str) -> Result<()> {
    let hash = store.mint_usdc(amount).await.map_err(|e| refused("mint", e))?;
    confirmed(OperationKind::Mint, hash);
    report(store).await;
    Ok(())
}

pub async fn deposit(store: &VaultStore, amount: &str, no_approve: bool) -> Result<()> {
    store.refresh().await;
    let result = if no_approve {
        store.deposit_approved(amount).await
    } else {
        store.deposit(amount).await
    };
    let hash = result.map_err(|e| refused("deposit", e))?;
    confirmed(OperationKind::Deposit, hash);
    report(store).await;
    Ok(())
}

pub async fn withdraw(store: &VaultStore, amount: &str) -> Result<()> {
    store.refresh().await;
    let hash = store.withdraw(amount).await.map_err(|e| refused("withdraw", e))?;
    confirmed(OperationKind::Withdraw, hash);
    report(store).await;
    Ok(())
}

pub async fn redeem(store: &VaultStore, shares: &str) -> Result<()> {
    store.refresh().await;
    let hash = store.redeem(shares).await.map_err(|e| refused("redeem", e))?;
    confirmed(OperationKind::Redeem, hash);
    report(store).await;
    Ok(())
}

pub async fn redeem_assets(store: &VaultStore, amount: &str) -> Result<()> {
    store.refresh().await;
    let hash = store.redeem_assets(amount).await.map_err(|e| refused("redeem", e))?;
    confirmed(OperationKind::Redeem, hash);
    report(store).await;
    Ok(())
}

pub async fn harvest(store: &VaultStore) -> Result<()> {
    store.refresh().await;
    let profit = show(&store.snapshot().available_profit, 2);
    println!("Harvesting {profit} USDC of profit...");
    let hash = store.harvest().await.map_err(|e| refused("harvest", e))?;
    confirmed(OperationKind::Harvest, hash);
    report(store).await;
    Ok(())
}

pub async fn simulate_yield(store: &VaultStore, amount: Option<&str>) -> Result<()> {
    store.refresh().await;
    let hash = store
        .simulate_yield(amount)
        .await
        .map_err(|e| refused("yield simulation", e))?;
    confirmed(OperationKind::SimulateYield, hash);
    report(store).await;
    Ok(())
}

pub async fn switch(store: &VaultStore) -> Result<()> {
    store
        .switch_to_local()
        .await
        .context("network switch failed (a bare node rejects it; see --wallet-rpc-url)")?;
    println!("Switched to chain {}.", store.network().target());
    Ok(())
}

/// Say whether anything reached the chain before the failure.
fn refused(action: &str, error: VaultError) -> anyhow::Error {
    if error.is_preflight() {
        anyhow::Error::new(error).context(format!("{action} not submitted"))
    } else {
        anyhow::Error::new(error).context(format!("{action} failed"))
    }
}

fn confirmed(kind: OperationKind, hash: TxHash) {
    println!("{kind} confirmed: {hash}");
}

async fn report(store: &VaultStore) {
    store.refresh().await;
    let s = store.snapshot();
    println!();
    println!("  USDC:     {}", show(&s.position.asset_balance, 2));
    println!("  Shares:   {}", show(&s.position.share_balance, 4));
    println!("  Vault:    {} USDC", show(&s.global.total_assets, 2));
    println!("  Profit:   {} USDC", show(&s.available_profit, 2));
}
