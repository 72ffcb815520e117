//! Backrun Bot
//!
//! Main entry point: JSON lines on stdin, arbitrage ideas on stdout

use std::env;
use std::path::PathBuf;

use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use backrun_bot::{load_market_seeds, BotService};
use backrun_core::BotConfig;

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the idea stream
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config_path = env::args_os()
        .nth(1)
        .or_else(|| env::var_os("BACKRUN_CONFIG"))
        .map(PathBuf::from);
    let config = BotConfig::load(config_path.as_deref())?;

    init_logging(config.feed.log_json);
    info!("Starting Backrun Bot v{}", env!("CARGO_PKG_VERSION"));

    let seeds = load_market_seeds(&config.feed.markets_path)?;
    let service = BotService::start(config, seeds).await?;
    info!("Reading trades from stdin");

    let result = service
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown_signal())
        .await;

    let stats = service.stats();
    info!(
        "Processed {} trades in {}s: {} ideas, {} stale, {} deadline hits, {} quote tasks timed out",
        stats.engine.trades_seen,
        stats.uptime_secs,
        stats.engine.ideas,
        stats.engine.stale,
        stats.engine.deadline_hits,
        stats.pool.timed_out
    );

    // the blocking stdin reader would otherwise hold the runtime open
    match result {
        Ok(()) => {
            info!("Shutdown complete");
            std::process::exit(0)
        }
        Err(e) => {
            error!("Bot stopped: {:#}", e);
            std::process::exit(1)
        }
    }
}
