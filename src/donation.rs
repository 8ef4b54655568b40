use alloy::primitives::{Address, address};
use serde::{Deserialize, Serialize};

use crate::model::amount::{ASSET_DECIMALS, DecimalAmount};

/// A public-goods recipient configured on the donation router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub address: Address,
    /// Share of each harvest, in basis points.
    pub bps: u16,
}

// Anvil accounts #1 and #2
const PUBLIC_GOODS_1: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
const PUBLIC_GOODS_2: Address = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

/// Recipients the local deployment script wires into the router, 70/30.
pub fn default_recipients() -> Vec<Recipient> {
    vec![
        Recipient {
            name: "Public Goods #1".into(),
            address: PUBLIC_GOODS_1,
            bps: 7_000,
        },
        Recipient {
            name: "Public Goods #2".into(),
            address: PUBLIC_GOODS_2,
            bps: 3_000,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientStats {
    pub name: String,
    pub address: Address,
    pub bps: u16,
    /// Stable asset the recipient holds, used as the donated total.
    pub received: DecimalAmount,
    /// What this recipient would get if the current profit were harvested now.
    pub pending_share: DecimalAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonationMetrics {
    pub total_donated: DecimalAmount,
    pub current_profit: DecimalAmount,
    pub recipients: Vec<RecipientStats>,
}

/// Combine recipient balances with the harvestable profit. `balances` is
/// aligned with `recipients`.
pub fn compute_donation_metrics(
    recipients: &[Recipient],
    balances: &[DecimalAmount],
    current_profit: &DecimalAmount,
) -> DonationMetrics {
    let mut total = DecimalAmount::zero(ASSET_DECIMALS);
    let stats = recipients
        .iter()
        .zip(balances)
        .map(|(r, received)| {
            total = total.saturating_add(received);
            RecipientStats {
                name: r.name.clone(),
                address: r.address,
                bps: r.bps,
                received: *received,
                pending_share: current_profit.mul_bps(r.bps),
            }
        })
        .collect();

    DonationMetrics {
        total_donated: total,
        current_profit: *current_profit,
        recipients: stats,
    }
}
