use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::model::chain::Chain;
use crate::network::WalletSession;

use super::{Ledger, QueryKey, ReadCall, ReceiptOutcome, WriteCall};

// ── Contract interfaces ──────────────────────────────────────────────

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IYdsVault {
        function totalAssets() external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function lastRecordedAssets() external view returns (uint256);
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function withdraw(uint256 assets, address receiver, address owner) external returns (uint256 shares);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256 assets);
        function harvest() external;
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IMockUsdc {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function mint(address to, uint256 amount) external;
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract IMockYieldAdapter {
        function simulateYield(uint256 yieldAmount) external;
    }
}

// ── Provider factory ─────────────────────────────────────────────────

pub fn read_provider(rpc_url: &str) -> AnyResult<DynProvider> {
    let url = rpc_url
        .parse()
        .with_context(|| format!("Invalid RPC URL '{rpc_url}'"))?;
    Ok(ProviderBuilder::new().connect_http(url).erased())
}

pub fn signing_provider(private_key: &str, rpc_url: &str) -> AnyResult<DynProvider> {
    let signer: alloy::signers::local::PrivateKeySigner = private_key
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid key: {e}"))?;
    let wallet = alloy::network::EthereumWallet::from(signer);
    let url = rpc_url
        .parse()
        .with_context(|| format!("Invalid RPC URL '{rpc_url}'"))?;
    Ok(ProviderBuilder::new().wallet(wallet).connect_http(url).erased())
}

// ── Ledger over JSON-RPC ─────────────────────────────────────────────

/// Alloy-backed ledger. Without a private key it can only read.
pub struct EvmLedger {
    reader: DynProvider,
    signer: Option<DynProvider>,
}

impl EvmLedger {
    pub fn connect(chain: &Chain, private_key: Option<&str>) -> AnyResult<Self> {
        let reader = read_provider(chain.rpc_url())?;
        let signer = private_key
            .map(|key| signing_provider(key, chain.rpc_url()))
            .transpose()?;
        Ok(EvmLedger { reader, signer })
    }
}

fn unreachable(e: impl std::fmt::Display) -> VaultError {
    VaultError::RpcUnreachable(e.to_string())
}

fn rejected(e: impl std::fmt::Display) -> VaultError {
    VaultError::SubmissionRejected(e.to_string())
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn read(&self, key: &QueryKey) -> Result<U256> {
        let p = &self.reader;
        match key.call {
            ReadCall::TotalAssets => IYdsVault::new(key.contract, p).totalAssets().call().await,
            ReadCall::TotalSupply => IYdsVault::new(key.contract, p).totalSupply().call().await,
            ReadCall::LastRecordedAssets => {
                IYdsVault::new(key.contract, p).lastRecordedAssets().call().await
            }
            ReadCall::BalanceOf(account) => {
                IMockUsdc::new(key.contract, p).balanceOf(account).call().await
            }
            ReadCall::Allowance { owner, spender } => {
                IMockUsdc::new(key.contract, p).allowance(owner, spender).call().await
            }
        }
        .map_err(unreachable)
    }

    async fn submit(&self, call: &WriteCall) -> Result<TxHash> {
        let p = self
            .signer
            .as_ref()
            .ok_or_else(|| rejected("no signer configured (read-only session)"))?;
        let gas = call.gas_limit();

        let pending = match *call {
            WriteCall::Approve { token, spender, amount } => {
                IMockUsdc::new(token, p).approve(spender, amount).send().await
            }
            WriteCall::Deposit { vault, assets, receiver } => {
                IYdsVault::new(vault, p).deposit(assets, receiver).send().await
            }
            WriteCall::Withdraw { vault, assets, receiver, owner } => {
                IYdsVault::new(vault, p).withdraw(assets, receiver, owner).send().await
            }
            WriteCall::Redeem { vault, shares, receiver, owner } => {
                IYdsVault::new(vault, p).redeem(shares, receiver, owner).send().await
            }
            WriteCall::Harvest { vault } => IYdsVault::new(vault, p).harvest().send().await,
            WriteCall::Mint { token, to, amount } => {
                let contract = IMockUsdc::new(token, p);
                let tx = contract.mint(to, amount);
                match gas {
                    Some(g) => tx.gas(g).send().await,
                    None => tx.send().await,
                }
            }
            WriteCall::SimulateYield { adapter, amount } => {
                let contract = IMockYieldAdapter::new(adapter, p);
                let tx = contract.simulateYield(amount);
                match gas {
                    Some(g) => tx.gas(g).send().await,
                    None => tx.send().await,
                }
            }
        }
        .map_err(rejected)?;

        let hash = *pending.tx_hash();
        debug!(kind = %call.kind(), %hash, "transaction accepted");
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptOutcome>> {
        let receipt = self
            .reader
            .get_transaction_receipt(hash)
            .await
            .map_err(unreachable)?;
        Ok(receipt.map(|r| {
            if r.status() {
                ReceiptOutcome::Success
            } else {
                ReceiptOutcome::Reverted {
                    reason: format!(
                        "reverted in block {:?} (gas_used: {})",
                        r.block_number, r.gas_used
                    ),
                }
            }
        }))
    }

    async fn chain_id(&self) -> Result<u64> {
        self.reader.get_chain_id().await.map_err(unreachable)
    }
}

// ── Wallet session over JSON-RPC ─────────────────────────────────────

/// Wallet endpoint that understands `wallet_switchEthereumChain` (EIP-3326).
///
/// A bare node such as Anvil reports its chain id but rejects the switch
/// method, so switching needs a wallet-facing endpoint (`--wallet-rpc-url`).
pub struct RpcWalletSession {
    provider: DynProvider,
}

impl RpcWalletSession {
    pub fn connect(wallet_rpc_url: &str) -> AnyResult<Self> {
        Ok(RpcWalletSession {
            provider: read_provider(wallet_rpc_url)?,
        })
    }
}

#[async_trait]
impl WalletSession for RpcWalletSession {
    async fn chain_id(&self) -> Result<u64> {
        self.provider.get_chain_id().await.map_err(unreachable)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        let params = [serde_json::json!({ "chainId": format!("{chain_id:#x}") })];
        let _: serde_json::Value = self
            .provider
            .raw_request("wallet_switchEthereumChain".into(), params)
            .await
            .map_err(rejected)?;
        Ok(())
    }
}

/// Account address for a hex private key.
pub fn account_for(private_key: &str) -> AnyResult<Address> {
    let signer: alloy::signers::local::PrivateKeySigner = private_key
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid key: {e}"))?;
    Ok(signer.address())
}
