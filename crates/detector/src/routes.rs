//! Candidate backrun routes for a trade

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

use backrun_core::{BackrunnableTrade, Hop, MintId, Route, TradeDirection};

use crate::graph::MarketGraph;

/// Which mints the backrun cycles through and in which order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    /// Always the trade's base mint; the route starts and ends here
    pub source_mint: MintId,
    pub intermediate_mint: MintId,
    /// The trade sold base on the original market, so the quote asset is
    /// cheap there: buy on the original market first
    pub buy_on_original_first: bool,
}

impl RoutePlan {
    pub fn for_trade(trade: &BackrunnableTrade) -> Self {
        Self {
            source_mint: trade.base_mint().clone(),
            intermediate_mint: trade.quote_mint().clone(),
            buy_on_original_first: trade.direction == TradeDirection::SoldBase,
        }
    }
}

/// Build every 2-hop and 3-hop cycle through the trade's market.
///
/// 3-hop candidates are shuffled when `rng` is given, since the deadline may
/// cut the search before all of them are priced. Routes visiting a market
/// twice are removed.
pub fn candidate_routes<R: Rng + ?Sized>(
    graph: &MarketGraph,
    trade: &BackrunnableTrade,
    rng: Option<&mut R>,
) -> Vec<Route> {
    let plan = RoutePlan::for_trade(trade);
    let original = &trade.market;
    let source = &plan.source_mint;
    let intermediate = &plan.intermediate_mint;

    let mut routes = Vec::new();

    let direct = graph.get_markets(source, intermediate);
    for market in direct {
        let hops = if plan.buy_on_original_first {
            vec![
                Hop::new(Arc::clone(original), trade.base_is_token_a),
                Hop::selling(Arc::clone(market), intermediate),
            ]
        } else {
            vec![
                Hop::selling(Arc::clone(market), source),
                Hop::new(Arc::clone(original), !trade.base_is_token_a),
            ]
        };
        routes.push(Route::new(hops));
    }

    let pairs = if plan.buy_on_original_first {
        graph.get_2hop_routes(intermediate, source)
    } else {
        graph.get_2hop_routes(source, intermediate)
    };
    let mut three_hop = pairs.to_vec();
    if let Some(rng) = rng {
        three_hop.shuffle(rng);
    }

    for pair in &three_hop {
        let hops = if plan.buy_on_original_first {
            let Some(via) = pair.first.other_mint(intermediate) else {
                continue;
            };
            vec![
                Hop::new(Arc::clone(original), trade.base_is_token_a),
                Hop::selling(Arc::clone(&pair.first), intermediate),
                Hop::selling(Arc::clone(&pair.second), via),
            ]
        } else {
            let Some(via) = pair.first.other_mint(source) else {
                continue;
            };
            vec![
                Hop::selling(Arc::clone(&pair.first), source),
                Hop::selling(Arc::clone(&pair.second), via),
                Hop::new(Arc::clone(original), !trade.base_is_token_a),
            ]
        };
        routes.push(Route::new(hops));
    }

    routes.retain(|route| !route.has_duplicate_market());

    debug!(
        "Found {} arb routes from {} 2hop and {} 3hop candidates",
        routes.len(),
        direct.len(),
        three_hop.len()
    );
    routes
}
