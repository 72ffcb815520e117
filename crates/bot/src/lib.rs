//! Backrun bot binary support
//!
//! Reads trades and pool updates as JSON lines, runs them through the
//! prioritised search pipeline and writes arbitrage ideas as JSON lines.

pub mod feed;
pub mod service;

pub use feed::{load_market_seeds, FeedMessage, HopMessage, IdeaMessage, MarketSeed};
pub use service::{BotService, ServiceStats};
