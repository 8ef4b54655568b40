//! The remote-ledger seam: contract reads, writes and receipts.

pub mod evm;

#[cfg(test)]
pub(crate) mod mock;

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;

use crate::error::Result;
use crate::model::operation::OperationKind;

/// A view method and its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReadCall {
    TotalAssets,
    TotalSupply,
    LastRecordedAssets,
    BalanceOf(Address),
    Allowance { owner: Address, spender: Address },
}

/// Identity of a polled value: which contract, which call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub contract: Address,
    pub call: ReadCall,
}

impl QueryKey {
    pub fn new(contract: Address, call: ReadCall) -> Self {
        QueryKey { contract, call }
    }
}

/// A state-changing call with its arguments in raw on-chain units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Approve { token: Address, spender: Address, amount: U256 },
    Deposit { vault: Address, assets: U256, receiver: Address },
    Withdraw { vault: Address, assets: U256, receiver: Address, owner: Address },
    Redeem { vault: Address, shares: U256, receiver: Address, owner: Address },
    Harvest { vault: Address },
    Mint { token: Address, to: Address, amount: U256 },
    SimulateYield { adapter: Address, amount: U256 },
}

impl WriteCall {
    pub fn kind(&self) -> OperationKind {
        match self {
            WriteCall::Approve { .. } => OperationKind::Approve,
            WriteCall::Deposit { .. } => OperationKind::Deposit,
            WriteCall::Withdraw { .. } => OperationKind::Withdraw,
            WriteCall::Redeem { .. } => OperationKind::Redeem,
            WriteCall::Harvest { .. } => OperationKind::Harvest,
            WriteCall::Mint { .. } => OperationKind::Mint,
            WriteCall::SimulateYield { .. } => OperationKind::SimulateYield,
        }
    }

    /// Fixed gas limits for calls whose estimation is unreliable on the mocks.
    pub fn gas_limit(&self) -> Option<u64> {
        match self {
            WriteCall::Mint { .. } => Some(100_000),
            WriteCall::SimulateYield { .. } => Some(150_000),
            _ => None,
        }
    }
}

/// How a mined transaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Success,
    Reverted { reason: String },
}

/// Everything the client needs from a JSON-RPC node.
///
/// Reads fail with `RpcUnreachable`, submissions with `SubmissionRejected`.
/// `receipt` returns `None` while the transaction is not mined yet.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn read(&self, key: &QueryKey) -> Result<U256>;

    async fn submit(&self, call: &WriteCall) -> Result<TxHash>;

    async fn receipt(&self, hash: TxHash) -> Result<Option<ReceiptOutcome>>;

    async fn chain_id(&self) -> Result<u64>;
}
