use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use yds_flow::config::ConfigArgs;
use yds_flow::model::chain::{LOCAL_CHAIN_ID, LOCAL_RPC_URL};

/// YDS vault client: mint test USDC, deposit, simulate yield and harvest
/// donations against a local vault deployment.
#[derive(Parser)]
#[command(name = "yds-flow", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// JSON-RPC endpoint of the chain
    #[arg(long, global = true, default_value = LOCAL_RPC_URL)]
    pub rpc_url: String,

    /// Wallet endpoint for chain switching (defaults to --rpc-url; a bare
    /// node cannot switch chains)
    #[arg(long, global = true)]
    pub wallet_rpc_url: Option<String>,

    /// Chain ID the wallet must be on
    #[arg(long, global = true, default_value_t = LOCAL_CHAIN_ID)]
    pub chain_id: u64,

    /// Address book JSON written by the deploy script
    #[arg(long, global = true, default_value = "contractAddresses.json")]
    pub addresses: PathBuf,

    /// Section of the address book to use
    #[arg(long, global = true, default_value = "localhost")]
    pub network_key: String,
}

impl ConnectionArgs {
    pub fn config_args(&self) -> ConfigArgs {
        ConfigArgs {
            rpc_url: self.rpc_url.clone(),
            wallet_rpc_url: self.wallet_rpc_url.clone(),
            chain_id: self.chain_id,
            addresses: self.addresses.clone(),
            network_key: self.network_key.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Show vault totals, share price, profit, position and donations
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Poll the vault every few seconds until Ctrl-C
    Watch,

    /// Check that the node is up and on the expected chain
    Probe,

    /// Show the wallet network and switch if it is wrong
    Network,

    /// Mint test USDC to the connected account
    Mint {
        /// Amount in USDC (up to 6 decimals)
        amount: String,
    },

    /// Deposit USDC, approving the vault first if needed
    Deposit {
        /// Amount in USDC (up to 6 decimals)
        amount: String,

        /// Only use the existing allowance; fail instead of approving
        #[arg(long)]
        no_approve: bool,
    },

    /// Withdraw an amount of USDC from the vault
    Withdraw {
        /// Amount in USDC (up to 6 decimals)
        amount: String,
    },

    /// Redeem an exact number of shares
    Redeem {
        /// Shares (up to 18 decimals)
        shares: String,
    },

    /// Redeem the shares worth an amount of USDC at the current price
    RedeemAssets {
        /// Amount in USDC (up to 6 decimals)
        amount: String,
    },

    /// Harvest profit above the watermark to the donation router
    Harvest,

    /// Add yield to the vault through the mock adapter
    SimulateYield {
        /// Amount in USDC; defaults to 10% of the position value
        amount: Option<String>,
    },

    /// Ask the wallet to switch to the target chain
    Switch,
}
