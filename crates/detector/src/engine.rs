//! Arbitrage search over prioritised trades

use alloy_primitives::U256;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use backrun_core::{
    now_ms, ArbIdea, BackrunnableTrade, EngineConfig, Hop, MarketId, MintId, PoolError, Quote,
    QuoteParams, Route, Timings,
};
use backrun_stages::PriorityStage;

use crate::graph::MarketGraph;
use crate::quoter::Quoter;
use crate::routes::candidate_routes;
use crate::search::SizeSearch;

/// `Ok(None)` when the quote timed out before a worker took it
type HopOutcome = Result<Option<Quote>, PoolError>;
type HopKey = (MarketId, MintId, U256);
type PendingHop = Shared<BoxFuture<'static, HopOutcome>>;

/// Per-trade hop memo keyed by (market, input mint, amount).
///
/// Concurrent requests for the same key share one in-flight quote, so
/// routes with a common prefix price it once per step. Failures are kept
/// too: pool state does not change under a single trade's search. Timeouts
/// are evicted once settled so a later request can retry.
#[derive(Default)]
struct QuoteCache {
    entries: Mutex<HashMap<HopKey, PendingHop>>,
    hits: AtomicU64,
}

impl QuoteCache {
    fn get_or_insert_with(
        &self,
        key: HopKey,
        quote: impl FnOnce() -> BoxFuture<'static, HopOutcome>,
    ) -> PendingHop {
        let mut entries = self.entries.lock();
        if let Some(pending) = entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return pending.clone();
        }
        let pending = quote().shared();
        entries.insert(key, pending.clone());
        pending
    }

    fn evict(&self, key: &HopKey) {
        self.entries.lock().remove(key);
    }
}

#[derive(Debug, Default)]
struct EngineCounters {
    trades_seen: AtomicU64,
    stale: AtomicU64,
    too_small: AtomicU64,
    no_routes: AtomicU64,
    routes_searched: AtomicU64,
    deadline_hits: AtomicU64,
    cache_hits: AtomicU64,
    ideas: AtomicU64,
}

/// Engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub trades_seen: u64,
    pub stale: u64,
    pub too_small: u64,
    pub no_routes: u64,
    pub routes_searched: u64,
    pub deadline_hits: u64,
    pub cache_hits: u64,
    pub ideas: u64,
}

/// Sizes and selects backruns for incoming trades
pub struct ArbSearchEngine<Q> {
    graph: Arc<MarketGraph>,
    quoter: Arc<Q>,
    config: EngineConfig,
    counters: EngineCounters,
}

impl<Q: Quoter + 'static> ArbSearchEngine<Q> {
    pub fn new(graph: Arc<MarketGraph>, quoter: Arc<Q>, config: EngineConfig) -> Self {
        Self {
            graph,
            quoter,
            config,
            counters: EngineCounters::default(),
        }
    }

    /// Drain `trades` until the stage ends, forwarding every idea.
    /// Only pool faults stop the loop early.
    pub async fn run(
        &self,
        trades: PriorityStage<BackrunnableTrade>,
        ideas: mpsc::UnboundedSender<ArbIdea>,
    ) -> Result<(), PoolError> {
        info!("Starting arb search engine");

        while let Some(trade) = trades.next().await {
            let Some(idea) = self.calculate_arb(&trade).await? else {
                continue;
            };
            if ideas.send(idea).is_err() {
                info!("Idea consumer closed, stopping arb search");
                break;
            }
        }

        let stats = self.stats();
        info!(
            "Arb search stopped: {} trades, {} ideas, {} stale, {} too small",
            stats.trades_seen, stats.ideas, stats.stale, stats.too_small
        );
        Ok(())
    }

    /// Search one trade. `Ok(None)` when the trade is skipped or nothing
    /// profitable is found.
    pub async fn calculate_arb(&self, trade: &BackrunnableTrade) -> Result<Option<ArbIdea>, PoolError> {
        self.counters.trades_seen.fetch_add(1, Ordering::Relaxed);

        let age = trade.age_ms(now_ms());
        if age > self.config.max_trade_age_ms {
            self.counters.stale.fetch_add(1, Ordering::Relaxed);
            debug!("Skipping trade {}: {}ms old", trade.signature, age);
            return Ok(None);
        }

        let num_steps = self.config.arb_calculation_num_steps;
        let step_size = trade
            .size
            .checked_div(U256::from(num_steps))
            .unwrap_or_default();
        if step_size.is_zero() {
            self.counters.too_small.fetch_add(1, Ordering::Relaxed);
            debug!("Skipping trade {}: size {} too small", trade.signature, trade.size);
            return Ok(None);
        }

        let routes = if self.config.shuffle_three_hop_routes {
            candidate_routes(&self.graph, trade, Some(&mut rand::thread_rng()))
        } else {
            candidate_routes::<rand::rngs::ThreadRng>(&self.graph, trade, None)
        };
        if routes.is_empty() {
            self.counters.no_routes.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        self.counters
            .routes_searched
            .fetch_add(routes.len() as u64, Ordering::Relaxed);

        let cache = QuoteCache::default();
        let mut search = SizeSearch::new(routes, self.config.flashloan_fee_bps);
        let budget = self.config.max_calculation_time();
        let started = Instant::now();

        for i in 1..=num_steps {
            if started.elapsed() > budget {
                self.counters.deadline_hits.fetch_add(1, Ordering::Relaxed);
                info!("Arb calculation took too long, stopping at iteration {}", i);
                break;
            }

            let active = search.active();
            if active.is_empty() {
                break;
            }

            let arb_size = step_size * U256::from(i);
            let remaining = budget.saturating_sub(started.elapsed());
            let quotes = join_all(
                active
                    .iter()
                    .map(|&index| self.quote_route(search.route(index), arb_size, &cache, remaining)),
            )
            .await;

            for (index, quote) in active.into_iter().zip(quotes) {
                search.record(index, quote?);
            }
        }

        self.counters
            .cache_hits
            .fetch_add(cache.hits.load(Ordering::Relaxed), Ordering::Relaxed);

        let Some(best) = search.best() else {
            return Ok(None);
        };
        info!(
            "Found {} arb opportunities for {}",
            search.profitable_count(),
            trade.signature
        );
        info!(
            "Potential arb: profit {} {} backrunning trade on {} ::: BUY {} on {}",
            best.profit,
            trade.base_mint(),
            trade.market.dex,
            best.quote.in_amount,
            best.route
        );

        self.counters.ideas.fetch_add(1, Ordering::Relaxed);
        Ok(Some(ArbIdea {
            signature: trade.signature.clone(),
            route: best.route,
            arb_size: best.quote.in_amount,
            expected_profit: best.profit,
            timings: Timings {
                calc_arb_end: now_ms(),
                build_bundle_end: 0,
                bundle_sent: 0,
                ..trade.timings
            },
        }))
    }

    /// Chain hop quotes; the first zero output ends the route
    async fn quote_route(
        &self,
        route: &Route,
        arb_size: U256,
        cache: &QuoteCache,
        timeout: Duration,
    ) -> Result<Quote, PoolError> {
        let mut amount = arb_size;
        let mut first_in = None;

        for hop in route.hops() {
            let key = (hop.market.id.clone(), hop.source_mint().clone(), amount);
            let quote = match self.quote_hop(hop, key.clone(), cache, timeout).await? {
                Some(quote) => quote,
                None => {
                    cache.evict(&key);
                    Quote::unpriceable(amount)
                }
            };
            first_in.get_or_insert(quote.in_amount);
            amount = quote.out_amount;
            if amount.is_zero() {
                break;
            }
        }

        Ok(Quote::new(first_in.unwrap_or(arb_size), amount))
    }

    fn quote_hop(&self, hop: &Hop, key: HopKey, cache: &QuoteCache, timeout: Duration) -> PendingHop {
        let amount = key.2;
        cache.get_or_insert_with(key, || {
            let quoter = Arc::clone(&self.quoter);
            let market = Arc::clone(&hop.market);
            let params = QuoteParams::exact_in(
                hop.source_mint().clone(),
                hop.destination_mint().clone(),
                amount,
            );

            async move {
                match quoter.quote(&market.id, params, timeout).await {
                    Ok(Some(quote)) => Ok(Some(quote)),
                    // inconclusive; the caller treats it as unpriceable
                    Ok(None) => Ok(None),
                    Err(e) => {
                        if let Some(fatal) = e.as_fatal() {
                            return Err(fatal.clone());
                        }
                        if e.is_expected() {
                            debug!("Error in calculate hop for {} {}: {}", market.dex, market.id, e);
                        } else {
                            warn!("Error in calculate hop for {} {}: {}", market.dex, market.id, e);
                        }
                        Ok(Some(Quote::unpriceable(amount)))
                    }
                }
            }
            .boxed()
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            trades_seen: c.trades_seen.load(Ordering::Relaxed),
            stale: c.stale.load(Ordering::Relaxed),
            too_small: c.too_small.load(Ordering::Relaxed),
            no_routes: c.no_routes.load(Ordering::Relaxed),
            routes_searched: c.routes_searched.load(Ordering::Relaxed),
            deadline_hits: c.deadline_hits.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            ideas: c.ideas.load(Ordering::Relaxed),
        }
    }
}
