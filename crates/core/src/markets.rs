//! Market and route definitions

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::{DexLabel, MarketId, MintId};

/// A two-sided venue market, registered once at startup and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub mint_a: MintId,
    pub mint_b: MintId,
    #[serde(default)]
    pub vault_a: Option<String>,
    #[serde(default)]
    pub vault_b: Option<String>,
    pub dex: DexLabel,
}

impl Market {
    pub fn new(id: impl Into<String>, mint_a: MintId, mint_b: MintId, dex: DexLabel) -> Self {
        Self {
            id: MarketId::new(id),
            mint_a,
            mint_b,
            vault_a: None,
            vault_b: None,
            dex,
        }
    }

    pub fn has_mint(&self, mint: &MintId) -> bool {
        &self.mint_a == mint || &self.mint_b == mint
    }

    /// The mint on the opposite side of `mint`
    pub fn other_mint(&self, mint: &MintId) -> Option<&MintId> {
        if &self.mint_a == mint {
            Some(&self.mint_b)
        } else if &self.mint_b == mint {
            Some(&self.mint_a)
        } else {
            None
        }
    }

    /// Mints consumed and produced when swapping in the given direction
    pub fn swap_mints(&self, from_a: bool) -> (&MintId, &MintId) {
        if from_a {
            (&self.mint_a, &self.mint_b)
        } else {
            (&self.mint_b, &self.mint_a)
        }
    }
}

/// One swap leg of a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub market: Arc<Market>,
    /// Swap mint A for mint B when true, B for A otherwise
    pub from_a: bool,
}

impl Hop {
    pub fn new(market: Arc<Market>, from_a: bool) -> Self {
        Self { market, from_a }
    }

    /// Hop that sells `source` on `market`
    pub fn selling(market: Arc<Market>, source: &MintId) -> Self {
        let from_a = &market.mint_a == source;
        Self { market, from_a }
    }

    pub fn source_mint(&self) -> &MintId {
        self.market.swap_mints(self.from_a).0
    }

    pub fn destination_mint(&self) -> &MintId {
        self.market.swap_mints(self.from_a).1
    }
}

/// Ordered list of hops; a valid route never visits a market twice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(Vec<Hop>);

impl Route {
    pub fn new(hops: Vec<Hop>) -> Self {
        Self(hops)
    }

    pub fn hops(&self) -> &[Hop] {
        &self.0
    }

    pub fn hop_count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn source_mint(&self) -> Option<&MintId> {
        self.0.first().map(Hop::source_mint)
    }

    pub fn has_duplicate_market(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.0.len());
        !self.0.iter().all(|hop| seen.insert(&hop.market.id))
    }

    pub fn market_ids(&self) -> impl Iterator<Item = &MarketId> {
        self.0.iter().map(|hop| &hop.market.id)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}({})", hop.market.dex, hop.market.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, a: &str, b: &str) -> Arc<Market> {
        Arc::new(Market::new(id, MintId::from(a), MintId::from(b), DexLabel::Raydium))
    }

    #[test]
    fn test_hop_direction() {
        let m = market("m1", "SOL", "USDC");
        let hop = Hop::selling(Arc::clone(&m), &MintId::from("USDC"));
        assert!(!hop.from_a);
        assert_eq!(hop.source_mint().as_str(), "USDC");
        assert_eq!(hop.destination_mint().as_str(), "SOL");
    }

    #[test]
    fn test_duplicate_market_detection() {
        let m1 = market("m1", "SOL", "USDC");
        let m2 = market("m2", "SOL", "USDC");

        let ok = Route::new(vec![Hop::new(Arc::clone(&m1), true), Hop::new(Arc::clone(&m2), false)]);
        assert!(!ok.has_duplicate_market());

        let bad = Route::new(vec![Hop::new(Arc::clone(&m1), true), Hop::new(m1, false)]);
        assert!(bad.has_duplicate_market());
    }

    #[test]
    fn test_other_mint() {
        let m = market("m1", "SOL", "USDC");
        assert_eq!(m.other_mint(&MintId::from("SOL")), Some(&MintId::from("USDC")));
        assert_eq!(m.other_mint(&MintId::from("BONK")), None);
    }
}
