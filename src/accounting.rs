//! Derived vault quantities: share price, available profit, previews.

use serde::Serialize;

use crate::model::amount::{ASSET_DECIMALS, DecimalAmount, PRICE_DECIMALS, SHARE_DECIMALS};

/// Ratios above this many assets per share are treated as bad data.
pub const SHARE_PRICE_CEILING: u64 = 1_000_000;

/// Simulated yield is this fraction of the position value.
pub const DEFAULT_YIELD_BPS: u16 = 1_000;

/// Assets per share. The 1.0 fallback is a policy, so the two reasons for
/// using it are kept apart from a real price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "price", rename_all = "snake_case")]
pub enum SharePrice {
    /// `totalAssets / totalSupply`, kept at share precision.
    Derived(DecimalAmount),
    /// `totalSupply == 0`: nothing deposited yet.
    NoDeposits,
    /// Ratio was zero, overflowed, or exceeded [`SHARE_PRICE_CEILING`].
    OutOfRange,
}

impl SharePrice {
    /// Full-precision price used for conversions.
    pub fn exact(&self) -> DecimalAmount {
        match self {
            SharePrice::Derived(p) => *p,
            SharePrice::NoDeposits | SharePrice::OutOfRange => DecimalAmount::one(SHARE_DECIMALS),
        }
    }

    /// Price at display precision (4 digits).
    pub fn value(&self) -> DecimalAmount {
        self.exact().rescale(PRICE_DECIMALS)
    }

    pub fn is_default(&self) -> bool {
        !matches!(self, SharePrice::Derived(_))
    }
}

pub fn compute_share_price(total_assets: &DecimalAmount, total_supply: &DecimalAmount) -> SharePrice {
    if total_supply.is_zero() {
        return SharePrice::NoDeposits;
    }
    let Some(ratio) = total_assets.div(total_supply, SHARE_DECIMALS) else {
        return SharePrice::OutOfRange;
    };
    if ratio.is_zero() || ratio > DecimalAmount::from_units(SHARE_PRICE_CEILING, SHARE_DECIMALS) {
        return SharePrice::OutOfRange;
    }
    SharePrice::Derived(ratio)
}

/// `max(0, totalAssets − watermark)` in asset units.
pub fn compute_available_profit(total_assets: &DecimalAmount, watermark: &DecimalAmount) -> DecimalAmount {
    total_assets.saturating_sub(watermark).rescale(ASSET_DECIMALS)
}

/// Shares received for depositing `assets`, or shares to redeem for a
/// desired asset withdrawal.
pub fn preview_shares(assets: &DecimalAmount, price: &SharePrice) -> DecimalAmount {
    assets
        .div(&price.exact(), SHARE_DECIMALS)
        .unwrap_or_else(|| DecimalAmount::zero(SHARE_DECIMALS))
}

/// Asset value of `shares` at `price`, truncated to asset precision.
pub fn preview_assets(shares: &DecimalAmount, price: &SharePrice) -> DecimalAmount {
    shares
        .mul(&price.exact(), ASSET_DECIMALS)
        .unwrap_or_else(|| DecimalAmount::zero(ASSET_DECIMALS))
}

/// Yield to simulate when the user did not pick an amount.
pub fn default_yield_amount(position_value: &DecimalAmount) -> DecimalAmount {
    position_value.rescale(ASSET_DECIMALS).mul_bps(DEFAULT_YIELD_BPS)
}
