//! Pipeline wiring: feed -> trade stage -> search engine -> idea stage -> output

use anyhow::Context;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use backrun_core::{by_normalized_size, ArbIdea, BackrunnableTrade, BotConfig, Market, MarketId};
use backrun_detector::{ArbSearchEngine, EngineStats, MarketGraph};
use backrun_stages::{BackpressureStage, PriorityStage};
use backrun_workers::{ConstantProductOracle, PoolStats, WorkerPool};

use crate::feed::{FeedMessage, IdeaMessage, MarketSeed};

type Pool = WorkerPool<ConstantProductOracle>;

/// Counters across the whole run
#[derive(Debug, Clone)]
pub struct ServiceStats {
    pub uptime_secs: u64,
    pub engine: EngineStats,
    pub pool: PoolStats,
}

/// Backrun bot service
pub struct BotService {
    config: BotConfig,
    pool: Arc<Pool>,
    graph: Arc<MarketGraph>,
    markets: Arc<HashMap<MarketId, Arc<Market>>>,
    engine: Arc<ArbSearchEngine<Pool>>,
    start_time: Instant,
}

impl BotService {
    /// Start the worker pool and register every seeded market with it
    pub async fn start(config: BotConfig, seeds: Vec<MarketSeed>) -> anyhow::Result<Self> {
        config.validate()?;

        let pool = WorkerPool::spawn(&config.workers, |_| ConstantProductOracle::new())
            .await
            .context("Failed to start worker pool")?;
        let pool = Arc::new(pool);

        let mut graph = MarketGraph::new();
        let mut markets = HashMap::with_capacity(seeds.len());
        for seed in seeds {
            let market = Arc::new(seed.market);
            if !graph.add_market(Arc::clone(&market)) {
                warn!("Skipping duplicate or self-paired market {}", market.id);
                continue;
            }
            let accounts = pool
                .add_pool(Arc::clone(&market), seed.reserves)
                .await
                .with_context(|| format!("Failed to add pool {}", market.id))?;
            debug!("Registered {} ({} update accounts)", market.id, accounts.len());
            markets.insert(market.id.clone(), market);
        }
        info!(
            "Registered {} markets across {} mints",
            graph.market_count(),
            graph.mint_count()
        );

        let graph = Arc::new(graph);
        let engine = Arc::new(ArbSearchEngine::new(
            Arc::clone(&graph),
            Arc::clone(&pool),
            config.engine.clone(),
        ));

        Ok(Self {
            config,
            pool,
            graph,
            markets: Arc::new(markets),
            engine,
            start_time: Instant::now(),
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn graph(&self) -> &MarketGraph {
        &self.graph
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Run the pipeline until `input` is exhausted and every idea is written,
    /// `shutdown` resolves, or the worker pool fails. Ideas already buffered
    /// when `shutdown` resolves are still written.
    ///
    /// Returns an error only for pool faults and output failures.
    pub async fn run<R, W, S>(&self, input: R, output: W, shutdown: S) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let (trade_tx, trade_rx) = mpsc::unbounded_channel();
        let (idea_tx, idea_rx) = mpsc::unbounded_channel();

        let trades = PriorityStage::spawn(
            UnboundedReceiverStream::new(trade_rx),
            by_normalized_size(self.config.base_mints.clone()),
            self.config.stages.trade_high_water_mark,
            "backrunnable-trades",
        );
        let ideas = BackpressureStage::spawn(
            UnboundedReceiverStream::new(idea_rx),
            self.config.stages.idea_high_water_mark,
            "arb-ideas",
        );

        let feed = tokio::spawn(read_feed(
            input,
            trade_tx,
            Arc::clone(&self.pool),
            Arc::clone(&self.markets),
        ));

        let engine = Arc::clone(&self.engine);
        let mut search = tokio::spawn(async move { engine.run(trades, idea_tx).await });

        let writer = write_ideas(&ideas, output);
        tokio::pin!(writer);
        tokio::pin!(shutdown);

        let searched = async {
            match (&mut search).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(fault)) => Err(anyhow::Error::new(fault).context("Arb search stopped")),
                Err(e) => Err(anyhow::Error::new(e).context("Arb search task failed")),
            }
        };

        let outcome = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, flushing buffered ideas");
                // dropping the engine's sender closes the idea stage
                feed.abort();
                search.abort();
                writer.as_mut().await
            }
            fault = self.pool.failed() => {
                Err(anyhow::Error::new(fault).context("Worker pool failed"))
            }
            // ideas are written as they arrive; the writer ends once the
            // engine drops its sender and the stage is drained
            res = async { tokio::try_join!(searched, writer.as_mut()) } => res.map(|_| ()),
        };

        feed.abort();
        search.abort();

        let stats = ideas.stats();
        info!(
            "{}: forwarded {} ideas, dropped {}",
            ideas.name(),
            stats.forwarded,
            stats.dropped
        );
        outcome
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            engine: self.engine.stats(),
            pool: self.pool.stats(),
        }
    }
}

/// Parse feed lines: trades go to the pipeline, pool updates are broadcast
/// to every worker before the next line is read
async fn read_feed<R>(
    input: R,
    trades: mpsc::UnboundedSender<BackrunnableTrade>,
    pool: Arc<Pool>,
    markets: Arc<HashMap<MarketId, Arc<Market>>>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Feed read error: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match FeedMessage::parse(line) {
            Ok(FeedMessage::Trade(msg)) => {
                let signature = msg.signature.clone();
                let Some(trade) = msg.into_trade(&markets) else {
                    warn!("Trade {} is on an unregistered market", signature);
                    continue;
                };
                if trades.send(trade).is_err() {
                    break;
                }
            }
            Ok(FeedMessage::PoolUpdate(update)) => {
                if !markets.contains_key(&update.market) {
                    warn!("Pool update for unregistered market {}", update.market);
                    continue;
                }
                match pool.update_pool(update.market.clone(), update.reserves).await {
                    Ok(n) => debug!("Updated {} on {} workers", update.market, n),
                    Err(e) => {
                        error!("Pool update for {} failed: {}", update.market, e);
                        break;
                    }
                }
            }
            Err(e) => warn!("Skipping malformed feed line: {}", e),
        }
    }
    info!("Feed closed");
}

async fn write_ideas<W>(ideas: &BackpressureStage<ArbIdea>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(idea) = ideas.next().await {
        let mut line = serde_json::to_vec(&IdeaMessage::from(&idea))?;
        line.push(b'\n');
        output.write_all(&line).await.context("Failed to write idea")?;
        output.flush().await?;
        info!(
            "Arb idea for {}: size {} profit {} via {}",
            idea.signature, idea.arb_size, idea.expected_profit, idea.route
        );
    }
    Ok(())
}
