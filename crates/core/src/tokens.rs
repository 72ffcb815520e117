//! Base mints and protocol constants
//!
//! Backruns always start and end in a base mint (USDC or SOL) so the
//! flashloan can be repaid in the borrowed asset.
//! - USDC: 6 decimals
//! - SOL: 9 decimals

use serde::{Deserialize, Serialize};

use crate::MintId;

pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

pub const USDC_DECIMALS: u8 = 6;
pub const SOL_DECIMALS: u8 = 9;

/// Solend turbo pool flashloan fee
pub const SOLEND_FLASHLOAN_FEE_BPS: u16 = 30;

/// A mint the bot is willing to borrow and settle in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseMint {
    pub mint: MintId,
    pub symbol: String,
    pub decimals: u8,
    /// Rough USD value of one whole token, used only to rank trades
    pub reference_price: f64,
}

impl BaseMint {
    pub fn new(mint: &str, symbol: &str, decimals: u8, reference_price: f64) -> Self {
        Self {
            mint: MintId::from(mint),
            symbol: symbol.to_string(),
            decimals,
            reference_price,
        }
    }

    pub fn usdc() -> Self {
        Self::new(USDC_MINT, "USDC", USDC_DECIMALS, 1.0)
    }

    pub fn sol() -> Self {
        Self::new(SOL_MINT, "SOL", SOL_DECIMALS, 20.0)
    }

    /// Convert a raw amount into reference-price units
    pub fn normalize(&self, raw: f64) -> f64 {
        raw / 10f64.powi(self.decimals as i32) * self.reference_price
    }
}

pub fn default_base_mints() -> Vec<BaseMint> {
    vec![BaseMint::usdc(), BaseMint::sol()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_accounts_for_decimals() {
        // 1 SOL at 20 vs 10 USDC
        let sol = BaseMint::sol().normalize(1_000_000_000.0);
        let usdc = BaseMint::usdc().normalize(10_000_000.0);
        assert!((sol - 20.0).abs() < 1e-9);
        assert!((usdc - 10.0).abs() < 1e-9);
        assert!(sol > usdc);
    }
}
