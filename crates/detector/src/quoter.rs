//! Async quoting seam between the search engine and the worker pool

use async_trait::async_trait;
use std::time::Duration;

use backrun_core::{MarketId, Quote, QuoteParams, QuoteResult};
use backrun_workers::{QuoteOracle, WorkerPool};

/// Single-market quoting with a time budget.
///
/// `Ok(None)` means the budget ran out before the request was picked up.
#[async_trait]
pub trait Quoter: Send + Sync {
    async fn quote(
        &self,
        market: &MarketId,
        params: QuoteParams,
        timeout: Duration,
    ) -> QuoteResult<Option<Quote>>;
}

#[async_trait]
impl<O: QuoteOracle> Quoter for WorkerPool<O> {
    async fn quote(
        &self,
        market: &MarketId,
        params: QuoteParams,
        timeout: Duration,
    ) -> QuoteResult<Option<Quote>> {
        self.calculate_quote(market, params, Some(timeout)).await
    }
}
