use serde::{Deserialize, Serialize};

/// Chain id Anvil and Hardhat report by default (`0x7a69`).
pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";

/// The chain the vault contracts live on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chain {
    /// Human-readable chain name.
    pub name: String,
    /// EVM chain ID wallets must be switched to.
    pub chain_id: u64,
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
}

// ── Methods ──────────────────────────────────────────────────────────

impl Chain {
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Hex form used by `eth_chainId` and `wallet_switchEthereumChain`.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }
}

// ── Convenience constructors ─────────────────────────────────────────

impl Chain {
    /// Local Anvil node.
    pub fn local() -> Self {
        Chain {
            name: "local-anvil".into(),
            chain_id: LOCAL_CHAIN_ID,
            rpc_url: LOCAL_RPC_URL.into(),
        }
    }

    pub fn custom(name: impl Into<String>, chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Chain {
            name: name.into(),
            chain_id,
            rpc_url: rpc_url.into(),
        }
    }
}

impl Default for Chain {
    fn default() -> Self {
        Chain::local()
    }
}

// ── Display ──────────────────────────────────────────────────────────

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}
