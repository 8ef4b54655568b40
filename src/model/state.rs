use serde::Serialize;

use crate::accounting::SharePrice;
use crate::donation::DonationMetrics;
use crate::liveness::LivenessStatus;
use crate::model::amount::DecimalAmount;
use crate::model::operation::PendingOperation;

/// A remote value that may not have been read yet. `NotYetLoaded` is never
/// conflated with zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Loadable<T> {
    NotYetLoaded,
    Loaded(T),
}

impl<T> Loadable<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Loadable::Loaded(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Loadable::Loaded(v) => Some(v),
            Loadable::NotYetLoaded => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loadable<U> {
        match self {
            Loadable::Loaded(v) => Loadable::Loaded(f(v)),
            Loadable::NotYetLoaded => Loadable::NotYetLoaded,
        }
    }
}

impl<T> From<Option<T>> for Loadable<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Loadable::Loaded(v),
            None => Loadable::NotYetLoaded,
        }
    }
}

/// Per-user holdings, rebuilt wholesale from the reader on every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultPosition {
    /// Stable asset in the wallet (6 decimals).
    pub asset_balance: Loadable<DecimalAmount>,
    /// Vault shares held (18 decimals).
    pub share_balance: Loadable<DecimalAmount>,
    /// Stable asset the vault may pull (6 decimals).
    pub allowance: Loadable<DecimalAmount>,
}

impl VaultPosition {
    pub fn not_loaded() -> Self {
        VaultPosition {
            asset_balance: Loadable::NotYetLoaded,
            share_balance: Loadable::NotYetLoaded,
            allowance: Loadable::NotYetLoaded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultGlobalState {
    pub total_assets: Loadable<DecimalAmount>,
    pub total_supply: Loadable<DecimalAmount>,
    /// `lastRecordedAssets`: the asset total as of the last harvest.
    pub watermark: Loadable<DecimalAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkState {
    pub current_chain_id: Option<u64>,
    pub target_chain_id: u64,
    pub is_switching: bool,
}

impl NetworkState {
    pub fn is_correct_network(&self) -> bool {
        self.current_chain_id == Some(self.target_chain_id)
    }
}

/// Immutable view handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct VaultSnapshot {
    pub global: VaultGlobalState,
    pub position: VaultPosition,
    pub share_price: Loadable<SharePrice>,
    pub available_profit: Loadable<DecimalAmount>,
    /// Position value in stable asset (`shares × price`).
    pub position_value: Loadable<DecimalAmount>,
    pub donations: Loadable<DonationMetrics>,
    pub operations: Vec<PendingOperation>,
    pub network: NetworkState,
    pub liveness: LivenessStatus,
    pub deposit_busy: bool,
}
