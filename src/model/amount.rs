use std::cmp::Ordering;
use std::fmt;

use alloy::primitives::U256;
use serde::{Serialize, Serializer};

use crate::error::{Result, VaultError};

/// Fractional digits of the stable asset (mock USDC).
pub const ASSET_DECIMALS: u8 = 6;
/// Fractional digits of vault shares.
pub const SHARE_DECIMALS: u8 = 18;
/// Fractional digits share prices are reported at.
pub const PRICE_DECIMALS: u8 = 4;

/// Largest scale we accept; 10^77 is the last power of ten that fits in a U256.
const MAX_SCALE: u8 = 77;

/// A non-negative fixed-point quantity: `raw / 10^scale`.
///
/// Values are immutable. Arithmetic across different scales goes through
/// [`DecimalAmount::rescale`] so raw magnitudes of 6- and 18-digit tokens
/// never get mixed directly.
#[derive(Debug, Clone, Copy)]
pub struct DecimalAmount {
    raw: U256,
    scale: u8,
}

pub(crate) fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

impl DecimalAmount {
    pub fn new(raw: U256, scale: u8) -> Self {
        DecimalAmount { raw, scale: scale.min(MAX_SCALE) }
    }

    pub fn zero(scale: u8) -> Self {
        Self::new(U256::ZERO, scale)
    }

    /// One whole unit at `scale` (e.g. 1.000000 USDC).
    pub fn one(scale: u8) -> Self {
        Self::new(pow10(scale.min(MAX_SCALE)), scale)
    }

    pub fn from_units(units: u64, scale: u8) -> Self {
        Self::new(U256::from(units).saturating_mul(pow10(scale.min(MAX_SCALE))), scale)
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Move to another scale. Growing the scale is exact; shrinking truncates
    /// (rounds toward zero), never up.
    pub fn rescale(&self, target: u8) -> Self {
        let target = target.min(MAX_SCALE);
        let raw = match target.cmp(&self.scale) {
            Ordering::Equal => self.raw,
            Ordering::Greater => self.raw.saturating_mul(pow10(target - self.scale)),
            Ordering::Less => self.raw / pow10(self.scale - target),
        };
        DecimalAmount { raw, scale: target }
    }

    /// Parse user-entered text such as `"100.5"` into an amount at `scale`.
    ///
    /// Accepts plain non-negative decimals only. Signs, exponents, separators
    /// and empty input are rejected. Fractional digits beyond `scale` are
    /// truncated.
    pub fn parse(text: &str, scale: u8) -> Result<Self> {
        let input = text.trim();
        if input.is_empty() {
            return Err(VaultError::invalid_amount(text, "empty amount"));
        }
        if scale > MAX_SCALE {
            return Err(VaultError::invalid_amount(text, "unsupported scale"));
        }

        let (int_part, frac_part) = match input.split_once('.') {
            Some((i, f)) => (i, f),
            None => (input, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(VaultError::invalid_amount(text, "no digits"));
        }
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(VaultError::invalid_amount(
                text,
                "expected a plain non-negative decimal number",
            ));
        }

        let kept = &frac_part[..frac_part.len().min(scale as usize)];
        let mut digits = String::with_capacity(int_part.len() + scale as usize);
        digits.push_str(int_part);
        digits.push_str(kept);
        for _ in kept.len()..scale as usize {
            digits.push('0');
        }
        let digits = digits.trim_start_matches('0');
        let raw = if digits.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(digits, 10)
                .map_err(|_| VaultError::invalid_amount(text, "amount too large"))?
        };
        Ok(DecimalAmount { raw, scale })
    }

    /// Lossy conversion for display and rough comparisons only.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse::<f64>().unwrap_or(f64::MAX)
    }

    /// Render with exactly `digits` fractional digits, truncating extra ones.
    pub fn format_fixed(&self, digits: u8) -> String {
        let truncated = self.rescale(digits.min(self.scale));
        let divisor = pow10(truncated.scale);
        let int = truncated.raw / divisor;
        let mut out = int.to_string();
        if digits > 0 {
            let frac = (truncated.raw % divisor).to_string();
            out.push('.');
            for _ in frac.len()..truncated.scale as usize {
                out.push('0');
            }
            if truncated.scale > 0 {
                out.push_str(&frac);
            }
            for _ in truncated.scale..digits {
                out.push('0');
            }
        }
        out
    }

    // ── Arithmetic ───────────────────────────────────────────────────

    fn common_scale(&self, other: &Self) -> (U256, U256, u8) {
        let scale = self.scale.max(other.scale);
        (self.rescale(scale).raw, other.rescale(scale).raw, scale)
    }

    pub fn saturating_add(&self, other: &Self) -> Self {
        let (a, b, scale) = self.common_scale(other);
        DecimalAmount { raw: a.saturating_add(b), scale }
    }

    /// `self - other`, floored at zero (holdings are never negative).
    pub fn saturating_sub(&self, other: &Self) -> Self {
        let (a, b, scale) = self.common_scale(other);
        DecimalAmount { raw: a.saturating_sub(b), scale }
    }


    /// `self × other`, reported at `out_scale` (truncated).
    pub fn mul(&self, other: &Self, out_scale: u8) -> Option<Self> {
        let product = self.raw.checked_mul(other.raw)?;
        let product_scale = self.scale as u16 + other.scale as u16;
        let out_scale = out_scale.min(MAX_SCALE);
        let raw = if product_scale >= out_scale as u16 {
            let shift = product_scale - out_scale as u16;
            if shift > MAX_SCALE as u16 {
                U256::ZERO
            } else {
                product / pow10(shift as u8)
            }
        } else {
            product.checked_mul(pow10(out_scale - product_scale as u8))?
        };
        Some(DecimalAmount { raw, scale: out_scale })
    }

    /// `self ÷ other`, reported at `out_scale` (truncated). `None` on a zero
    /// divisor or when the result does not fit.
    pub fn div(&self, other: &Self, out_scale: u8) -> Option<Self> {
        if other.raw.is_zero() {
            return None;
        }
        let out_scale = out_scale.min(MAX_SCALE);
        // raw_out = a * 10^(out + sb - sa) / b
        let exp = out_scale as i32 + other.scale as i32 - self.scale as i32;
        let raw = if exp >= 0 {
            if exp > MAX_SCALE as i32 {
                return None;
            }
            self.raw.checked_mul(pow10(exp as u8))? / other.raw
        } else {
            let down = (-exp) as u32;
            if down > MAX_SCALE as u32 {
                U256::ZERO
            } else {
                self.raw / other.raw.checked_mul(pow10(down as u8))?
            }
        };
        Some(DecimalAmount { raw, scale: out_scale })
    }

    /// Multiply by a basis-point fraction (`bps / 10_000`), truncating.
    pub fn mul_bps(&self, bps: u16) -> Self {
        let raw = self.raw.saturating_mul(U256::from(bps)) / U256::from(10_000u64);
        DecimalAmount { raw, scale: self.scale }
    }
}

// ── Comparison across scales ─────────────────────────────────────────

impl PartialEq for DecimalAmount {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DecimalAmount {}

impl PartialOrd for DecimalAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DecimalAmount {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b, _) = self.common_scale(other);
        a.cmp(&b)
    }
}

// ── Display / serde ──────────────────────────────────────────────────

impl fmt::Display for DecimalAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_fixed(self.scale))
    }
}

impl Serialize for DecimalAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
