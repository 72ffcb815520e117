//! JSON wire formats for the upstream feed, the market seed file and the
//! idea output

use alloy_primitives::{I256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use backrun_core::{
    now_ms, ArbIdea, BackrunnableTrade, ConfigError, ConfigResult, DexLabel, Market, MarketId,
    MintId, Timings, TradeDirection,
};
use backrun_workers::Reserves;

/// One entry of the market seed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSeed {
    pub market: Market,
    pub reserves: Reserves,
}

/// Read the JSON array of market seeds registered at startup
pub fn load_market_seeds(path: &Path) -> ConfigResult<Vec<MarketSeed>> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

/// A line of the upstream feed
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Trade(TradeMessage),
    PoolUpdate(PoolUpdateMessage),
}

impl FeedMessage {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Trade that moved a registered market
#[derive(Debug, Clone, Deserialize)]
pub struct TradeMessage {
    pub signature: String,
    pub market: MarketId,
    pub base_is_token_a: bool,
    pub direction: TradeDirection,
    pub size: U256,
    /// Defaults to the time the line is read
    #[serde(default)]
    pub observed_at_ms: Option<u64>,
    #[serde(default)]
    pub timings: Timings,
}

impl TradeMessage {
    /// Resolve the market; `None` if it was never registered
    pub fn into_trade(self, markets: &HashMap<MarketId, Arc<Market>>) -> Option<BackrunnableTrade> {
        let market = Arc::clone(markets.get(&self.market)?);
        Some(BackrunnableTrade {
            signature: self.signature,
            market,
            base_is_token_a: self.base_is_token_a,
            direction: self.direction,
            size: self.size,
            observed_at_ms: self.observed_at_ms.unwrap_or_else(now_ms),
            timings: self.timings,
        })
    }
}

/// Fresh reserves for a registered market
#[derive(Debug, Clone, Deserialize)]
pub struct PoolUpdateMessage {
    pub market: MarketId,
    pub reserves: Reserves,
}

/// One hop of an emitted idea
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopMessage {
    pub market: MarketId,
    pub dex: DexLabel,
    pub source_mint: MintId,
    pub destination_mint: MintId,
}

/// Output line for one idea; amounts are decimal strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaMessage {
    pub signature: String,
    pub source_mint: Option<MintId>,
    pub arb_size: String,
    pub expected_profit: String,
    pub route: Vec<HopMessage>,
    pub timings: Timings,
}

impl From<&ArbIdea> for IdeaMessage {
    fn from(idea: &ArbIdea) -> Self {
        Self {
            signature: idea.signature.clone(),
            source_mint: idea.source_mint().cloned(),
            arb_size: idea.arb_size.to_string(),
            expected_profit: idea.expected_profit.to_string(),
            route: idea
                .route
                .hops()
                .iter()
                .map(|hop| HopMessage {
                    market: hop.market.id.clone(),
                    dex: hop.market.dex.clone(),
                    source_mint: hop.source_mint().clone(),
                    destination_mint: hop.destination_mint().clone(),
                })
                .collect(),
            timings: idea.timings,
        }
    }
}

impl IdeaMessage {
    pub fn arb_size(&self) -> Option<U256> {
        self.arb_size.parse().ok()
    }

    pub fn expected_profit(&self) -> Option<I256> {
        self.expected_profit.parse().ok()
    }
}
