use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::donation::{Recipient, default_recipients};
use crate::ledger::evm::account_for;
use crate::model::chain::Chain;
use crate::retry::RetryPolicy;

pub const PRIVATE_KEY_ENV: &str = "YDS_PRIVATE_KEY";

// ── Address book ─────────────────────────────────────────────────────

/// Deployed contract addresses for one network, as written by the
/// deployment script (`contractAddresses.json`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressBook {
    /// Mintable test stablecoin (6 decimals).
    #[serde(rename = "USDC_MOCK")]
    pub stable_token: Address,
    /// Share-based yield-donating vault (18-decimal shares).
    #[serde(rename = "YDS_VAULT")]
    pub vault: Address,
    #[serde(rename = "DONATION_ROUTER")]
    pub donation_router: Address,
    /// Adapter exposing `simulateYield`.
    #[serde(rename = "MOCK_YIELD_ADAPTER", alias = "AAVE_ADAPTER")]
    pub yield_adapter: Address,
    #[serde(rename = "DONATION_RECIPIENTS", default = "default_recipients")]
    pub recipients: Vec<Recipient>,
}

impl AddressBook {
    /// Load the `network` section of an address-book file.
    pub fn load(path: &Path, network: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading address book {}", path.display()))?;
        Self::from_json(&contents, network)
            .with_context(|| format!("parsing address book {}", path.display()))
    }

    pub fn from_json(contents: &str, network: &str) -> Result<Self> {
        let mut sections: HashMap<String, AddressBook> =
            serde_json::from_str(contents).context("invalid address book JSON")?;
        sections
            .remove(network)
            .with_context(|| format!("no '{network}' section in address book"))
    }
}

// ── Timing policy ────────────────────────────────────────────────────

/// Every delay and cadence the client uses, in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    pub poll_interval: Duration,
    pub reconcile_offsets: Vec<Duration>,
    /// Wait between approve confirmation and the automatic deposit.
    pub approve_settle: Duration,
    /// How long a confirmed deposit stays visible before the input resets.
    pub clear_input_after: Duration,
    /// How long a tracker keeps its terminal state before going idle.
    pub terminal_grace: Duration,
    pub network_settle: Duration,
    pub liveness_interval: Duration,
    /// Consecutive probe failures before reporting "not connected".
    pub liveness_failures: u32,
    pub receipt_policy: RetryPolicy,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            poll_interval: Duration::from_secs(3),
            reconcile_offsets: vec![Duration::from_millis(500), Duration::from_millis(2500)],
            approve_settle: Duration::from_millis(1500),
            clear_input_after: Duration::from_secs(2),
            terminal_grace: Duration::from_secs(2),
            network_settle: Duration::from_secs(1),
            liveness_interval: Duration::from_secs(10),
            liveness_failures: 3,
            receipt_policy: RetryPolicy::new(120, Duration::from_millis(500)),
        }
    }
}

// ── Runtime config ───────────────────────────────────────────────────

/// Runtime configuration for every command.
pub struct RuntimeConfig {
    pub chain: Chain,
    pub addresses: AddressBook,
    /// Connected account; `None` runs read-only.
    pub account: Option<Address>,
    pub private_key: Option<String>,
    /// Endpoint answering `wallet_switchEthereumChain`; the node itself when unset.
    pub wallet_rpc_url: Option<String>,
    pub timings: Timings,
}

/// CLI-facing options before env var resolution.
pub struct ConfigArgs {
    pub rpc_url: String,
    pub wallet_rpc_url: Option<String>,
    pub chain_id: u64,
    pub addresses: PathBuf,
    pub network_key: String,
}

impl RuntimeConfig {
    pub fn from_cli(args: &ConfigArgs) -> Result<Self> {
        let addresses = AddressBook::load(&args.addresses, &args.network_key)?;
        let chain = Chain::custom("local-anvil", args.chain_id, args.rpc_url.clone());

        let private_key = std::env::var(PRIVATE_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        let account = match &private_key {
            Some(key) => Some(
                account_for(key).with_context(|| format!("reading {PRIVATE_KEY_ENV}"))?,
            ),
            None => None,
        };

        Ok(RuntimeConfig {
            chain,
            addresses,
            account,
            private_key,
            wallet_rpc_url: args.wallet_rpc_url.clone(),
            timings: Timings::default(),
        })
    }

    /// Where wallet session calls go.
    pub fn wallet_rpc_url(&self) -> &str {
        self.wallet_rpc_url.as_deref().unwrap_or(self.chain.rpc_url())
    }
}
