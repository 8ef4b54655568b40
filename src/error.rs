use thiserror::Error;

use crate::model::operation::OperationKind;

/// Every failure the vault client can report. None of these are fatal:
/// each one leaves the affected operation in an inspectable terminal state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: String },

    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("RPC unreachable: {0}")]
    RpcUnreachable(String),

    #[error("transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: String, available: String },

    #[error("insufficient allowance: requested {requested}, approved {approved}")]
    InsufficientAllowance { requested: String, approved: String },

    #[error("{0} already in flight")]
    Busy(OperationKind),

    #[error("no account connected")]
    NotConnected,

    #[error("nothing to harvest: vault assets have not exceeded the watermark")]
    NothingToHarvest,
}

impl VaultError {
    pub fn invalid_amount(input: &str, reason: impl Into<String>) -> Self {
        VaultError::InvalidAmount {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors caught before any network call was made.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            VaultError::InvalidAmount { .. }
                | VaultError::InsufficientFunds { .. }
                | VaultError::InsufficientAllowance { .. }
                | VaultError::NotConnected
                | VaultError::NothingToHarvest
                | VaultError::Busy(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
