//! Backrun arbitrage detection
//!
//! Features:
//! - Market graph with cached 2-hop enumeration
//! - 2-hop and 3-hop cycle construction through the moved market
//! - Stepped size search with unimodal pruning under a deadline

pub mod graph;
pub mod routes;
pub mod search;
pub mod quoter;
pub mod engine;

pub use graph::{MarketGraph, TwoHopRoute};
pub use routes::{candidate_routes, RoutePlan};
pub use search::{PruneReason, RouteProgress, RouteState, SearchResult, SizeSearch};
pub use quoter::Quoter;
pub use engine::{ArbSearchEngine, EngineStats};
