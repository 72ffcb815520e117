//! Per-route bookkeeping for the stepped size search

use alloy_primitives::I256;

use backrun_core::{Quote, Route};

/// Why a route left the search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    /// Some hop could not be priced at this size
    ZeroOutput,
    /// Profit did not improve on the previous step
    NoImprovement,
}

/// Lifecycle of one candidate during the search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Active,
    Pruned(PruneReason),
}

#[derive(Debug, Clone)]
pub struct RouteProgress {
    pub route: Route,
    pub state: RouteState,
    /// Best quote so far with its profit; never decreases
    pub best: Option<(Quote, I256)>,
    pub steps: u32,
}

impl RouteProgress {
    fn new(route: Route) -> Self {
        Self {
            route,
            state: RouteState::Active,
            best: None,
            steps: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == RouteState::Active
    }

    pub fn best_profit(&self) -> Option<I256> {
        self.best.map(|(_, profit)| profit)
    }
}

/// Stepped search over candidate routes.
///
/// Profit is assumed unimodal in size: a route is pruned the first time a
/// step fails to beat its previous profit. Concave-breaking venues may be
/// pruned before their real peak.
#[derive(Debug)]
pub struct SizeSearch {
    routes: Vec<RouteProgress>,
    flashloan_fee_bps: u16,
}

/// Winning route and the quote that produced its best profit
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub route: Route,
    pub quote: Quote,
    pub profit: I256,
}

impl SizeSearch {
    pub fn new(routes: Vec<Route>, flashloan_fee_bps: u16) -> Self {
        Self {
            routes: routes.into_iter().map(RouteProgress::new).collect(),
            flashloan_fee_bps,
        }
    }

    /// Indices of routes still being stepped
    pub fn active(&self) -> Vec<usize> {
        self.routes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_active())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.routes.iter().any(RouteProgress::is_active)
    }

    pub fn route(&self, index: usize) -> &Route {
        &self.routes[index].route
    }

    pub fn progress(&self) -> &[RouteProgress] {
        &self.routes
    }

    /// Apply one step's quote; returns the route's new state
    pub fn record(&mut self, index: usize, quote: Quote) -> RouteState {
        let fee_bps = self.flashloan_fee_bps;
        let progress = &mut self.routes[index];
        if !progress.is_active() {
            return progress.state;
        }
        progress.steps += 1;

        if quote.is_unpriceable() {
            progress.state = RouteState::Pruned(PruneReason::ZeroOutput);
            return progress.state;
        }

        let profit = quote.profit(fee_bps);
        match progress.best_profit() {
            Some(previous) if profit <= previous => {
                progress.state = RouteState::Pruned(PruneReason::NoImprovement);
            }
            _ => progress.best = Some((quote, profit)),
        }
        progress.state
    }

    /// Highest positive profit recorded by any route, pruned or not
    pub fn best(&self) -> Option<SearchResult> {
        self.routes
            .iter()
            .filter_map(|r| r.best.map(|(quote, profit)| (r, quote, profit)))
            .filter(|(_, _, profit)| profit.is_positive())
            .max_by(|a, b| a.2.cmp(&b.2))
            .map(|(r, quote, profit)| SearchResult {
                route: r.route.clone(),
                quote,
                profit,
            })
    }

    /// Routes with a positive recorded profit
    pub fn profitable_count(&self) -> usize {
        self.routes
            .iter()
            .filter(|r| r.best_profit().is_some_and(|p| p.is_positive()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use backrun_core::{DexLabel, Hop, Market, MintId};
    use std::sync::Arc;

    fn route(id: &str) -> Route {
        let m = Arc::new(Market::new(id, MintId::from("A"), MintId::from("B"), DexLabel::Orca));
        Route::new(vec![Hop::new(m, true)])
    }

    /// Quote whose profit (no fee) is `profit` at size `size`
    fn quote(size: u64, profit: i64) -> Quote {
        let out = (size as i64 + profit) as u64;
        Quote::new(U256::from(size), U256::from(out))
    }

    fn i256(v: i64) -> I256 {
        I256::try_from(v).unwrap()
    }

    #[test]
    fn test_prunes_after_profit_drops() {
        let mut search = SizeSearch::new(vec![route("r")], 0);

        let profits = [-5, -3, 10, 8];
        let mut states = Vec::new();
        for (i, p) in profits.iter().enumerate() {
            states.push(search.record(0, quote(100 * (i as u64 + 1), *p)));
        }

        assert_eq!(&states[..3], &[RouteState::Active; 3]);
        assert_eq!(states[3], RouteState::Pruned(PruneReason::NoImprovement));

        let best = search.best().unwrap();
        assert_eq!(best.quote.in_amount, U256::from(300u64));
        assert_eq!(best.profit, i256(10));
        assert!(search.is_exhausted());
    }

    #[test]
    fn test_zero_output_prunes() {
        let mut search = SizeSearch::new(vec![route("r")], 0);
        search.record(0, quote(100, 4));
        let state = search.record(0, Quote::unpriceable(U256::from(200u64)));

        assert_eq!(state, RouteState::Pruned(PruneReason::ZeroOutput));
        // the earlier profit is still a candidate
        assert_eq!(search.best().unwrap().profit, i256(4));
    }

    #[test]
    fn test_pruned_route_ignores_further_quotes() {
        let mut search = SizeSearch::new(vec![route("r")], 0);
        search.record(0, quote(100, 5));
        search.record(0, quote(200, 5));
        search.record(0, quote(300, 50));

        assert_eq!(search.progress()[0].steps, 2);
        assert_eq!(search.best().unwrap().profit, i256(5));
    }

    #[test]
    fn test_only_positive_profit_selected() {
        let mut search = SizeSearch::new(vec![route("a"), route("b")], 0);
        search.record(0, quote(100, -1));
        search.record(1, quote(100, 0));

        assert!(search.best().is_none());
        assert_eq!(search.profitable_count(), 0);
    }

    #[test]
    fn test_selects_highest_profit_across_routes() {
        let mut search = SizeSearch::new(vec![route("a"), route("b"), route("c")], 0);
        search.record(0, quote(100, 3));
        search.record(1, quote(100, 7));
        search.record(2, quote(100, 5));
        search.record(1, quote(200, 2));

        let best = search.best().unwrap();
        assert_eq!(best.route.market_ids().next().unwrap().as_str(), "b");
        assert_eq!(best.profit, i256(7));
        assert_eq!(search.active(), vec![0, 2]);
        assert_eq!(search.profitable_count(), 3);
    }

    #[test]
    fn test_flashloan_fee_counts_against_profit() {
        // 30 bps on 10_000 is 30, so +20 gross is a loss
        let mut search = SizeSearch::new(vec![route("r")], 30);
        search.record(0, quote(10_000, 20));
        assert!(search.best().is_none());
    }

    #[test]
    fn test_best_profit_is_monotonic() {
        let mut search = SizeSearch::new(vec![route("r")], 0);
        let mut last = None;
        for (i, p) in [-10, -4, 1, 6, 6, 20].iter().enumerate() {
            search.record(0, quote(100 * (i as u64 + 1), *p));
            let best = search.progress()[0].best_profit();
            if let (Some(prev), Some(now)) = (last, best) {
                assert!(now >= prev);
            }
            last = best;
        }
        assert_eq!(search.best().unwrap().profit, i256(6));
    }
}
