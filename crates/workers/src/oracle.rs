//! Quote oracle capability owned by each worker replica

use alloy_primitives::U256;

use backrun_core::{
    Market, MarketId, Quote, QuoteParams, QuoteResult, RouteHopParams, SwapLeg, SwapParams,
};

/// Per-venue pricing math over a private replica of pool state.
///
/// Every worker owns one oracle. Replicas are seeded with `add_pool` and
/// kept current with `update_pool`, both delivered to every worker as
/// broadcasts; quoting never mutates state.
pub trait QuoteOracle: 'static {
    /// Serialized pool state shipped to every replica
    type Snapshot: Clone + Send + Sync + 'static;

    /// Register a market; returns the accounts whose updates the pool needs
    fn add_pool(&mut self, market: &Market, snapshot: Self::Snapshot) -> QuoteResult<Vec<String>>;

    fn update_pool(&mut self, market: &MarketId, snapshot: Self::Snapshot) -> QuoteResult<()>;

    fn calculate_quote(&self, market: &MarketId, params: &QuoteParams) -> QuoteResult<Quote>;

    /// Chain hops exact-in. Any hop failure yields a zero output and the
    /// chain stops at the first zero.
    fn calculate_route(&self, amount: U256, hops: &[RouteHopParams]) -> Quote {
        let mut out = amount;
        for hop in hops {
            let params = QuoteParams::exact_in(
                hop.source_mint.clone(),
                hop.destination_mint.clone(),
                out,
            );
            out = match self.calculate_quote(&hop.market, &params) {
                Ok(quote) => quote.out_amount,
                Err(_) => U256::ZERO,
            };
            if out.is_zero() {
                break;
            }
        }
        Quote::new(amount, out)
    }

    fn calculate_swap_leg(&self, market: &MarketId, params: &SwapParams) -> QuoteResult<SwapLeg>;
}
