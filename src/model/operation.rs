use std::fmt;

use alloy::primitives::TxHash;
use serde::Serialize;

/// Every write the client can issue. Each kind gets its own tracker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Approve,
    Deposit,
    Withdraw,
    Redeem,
    Harvest,
    Mint,
    SimulateYield,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Approve,
        OperationKind::Deposit,
        OperationKind::Withdraw,
        OperationKind::Redeem,
        OperationKind::Harvest,
        OperationKind::Mint,
        OperationKind::SimulateYield,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Approve => "approve",
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Redeem => "redeem",
            OperationKind::Harvest => "harvest",
            OperationKind::Mint => "mint",
            OperationKind::SimulateYield => "simulateYield",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lifecycle of one write: `Idle → Submitting → AwaitingConfirmation →
/// Confirmed`, or `Failed` from either in-flight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    /// Handed to the signer, not yet accepted ("pending").
    Submitting,
    /// Accepted with a hash, waiting for the receipt ("confirming").
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl LifecycleState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, LifecycleState::Submitting | LifecycleState::AwaitingConfirmation)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Confirmed | LifecycleState::Failed)
    }
}

/// Snapshot of one operation slot as seen by a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub submitted_hash: Option<TxHash>,
    pub state: LifecycleState,
    /// Revert reason or rejection message when `state == Failed`.
    pub failure: Option<String>,
}

impl PendingOperation {
    pub fn idle(kind: OperationKind) -> Self {
        PendingOperation {
            kind,
            submitted_hash: None,
            state: LifecycleState::Idle,
            failure: None,
        }
    }
}
