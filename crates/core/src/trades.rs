//! Backrunnable trades and arbitrage ideas

use alloy_primitives::{I256, U256};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::{BaseMint, Market, MintId, Route, Timings, TradeDirection};

/// A trade that moved a market's price, produced by the simulate-and-diff stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackrunnableTrade {
    /// Signature of the transaction being backrun
    pub signature: String,
    pub market: Arc<Market>,
    pub base_is_token_a: bool,
    pub direction: TradeDirection,
    /// Absolute change of the base vault balance
    pub size: U256,
    /// First observation, epoch milliseconds
    pub observed_at_ms: u64,
    #[serde(default)]
    pub timings: Timings,
}

impl BackrunnableTrade {
    pub fn base_mint(&self) -> &MintId {
        if self.base_is_token_a {
            &self.market.mint_a
        } else {
            &self.market.mint_b
        }
    }

    pub fn quote_mint(&self) -> &MintId {
        if self.base_is_token_a {
            &self.market.mint_b
        } else {
            &self.market.mint_a
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.observed_at_ms)
    }

    pub fn is_stale(&self, max_age_ms: u64, now_ms: u64) -> bool {
        self.age_ms(now_ms) > max_age_ms
    }

    /// Trade size in reference-price units; unknown base mints rank by raw size
    pub fn normalized_size(&self, base_mints: &[BaseMint]) -> f64 {
        let raw: f64 = self.size.to_string().parse().unwrap_or(0.0);
        base_mints
            .iter()
            .find(|b| &b.mint == self.base_mint())
            .map(|b| b.normalize(raw))
            .unwrap_or(raw)
    }
}

/// Comparator that serves the largest normalised trade first
pub fn by_normalized_size(
    base_mints: Vec<BaseMint>,
) -> impl Fn(&BackrunnableTrade, &BackrunnableTrade) -> Ordering + Send + Sync + 'static {
    move |a, b| {
        a.normalized_size(&base_mints)
            .partial_cmp(&b.normalized_size(&base_mints))
            .unwrap_or(Ordering::Equal)
    }
}

/// Profitable backrun found for a trade, forwarded to bundle construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbIdea {
    pub signature: String,
    pub route: Route,
    pub arb_size: U256,
    pub expected_profit: I256,
    pub timings: Timings,
}

impl ArbIdea {
    pub fn source_mint(&self) -> Option<&MintId> {
        self.route.source_mint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DexLabel, SOL_MINT, USDC_MINT};

    fn trade(base_is_token_a: bool, size: u64) -> BackrunnableTrade {
        BackrunnableTrade {
            signature: "sig".into(),
            market: Arc::new(Market::new(
                "m1",
                MintId::from(SOL_MINT),
                MintId::from(USDC_MINT),
                DexLabel::Raydium,
            )),
            base_is_token_a,
            direction: TradeDirection::SoldBase,
            size: U256::from(size),
            observed_at_ms: 1_000,
            timings: Timings::default(),
        }
    }

    #[test]
    fn test_base_and_quote_mints() {
        let t = trade(false, 1);
        assert_eq!(t.base_mint().as_str(), USDC_MINT);
        assert_eq!(t.quote_mint().as_str(), SOL_MINT);
    }

    #[test]
    fn test_staleness() {
        let t = trade(true, 1);
        assert!(!t.is_stale(500, 1_400));
        assert!(t.is_stale(500, 1_501));
        // clock skew never underflows
        assert_eq!(t.age_ms(0), 0);
    }

    #[test]
    fn test_size_comparator_prefers_value_not_raw_units() {
        let cmp = by_normalized_size(crate::default_base_mints());
        // 1 SOL (~20 USD) vs 15 USDC
        let sol_trade = trade(true, 1_000_000_000);
        let usdc_trade = trade(false, 15_000_000);
        assert_eq!(cmp(&sol_trade, &usdc_trade), Ordering::Greater);
    }
}
