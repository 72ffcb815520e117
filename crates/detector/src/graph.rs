//! Market graph over token mints
//!
//! Nodes are mints, edges are the markets listing a pair. Several venues may
//! list the same pair, so an edge holds a list of markets. The graph is
//! built once at startup; 2-hop enumerations are cached per direction.

use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use backrun_core::{Market, MarketId, MintId};

static NO_NEIGHBOURS: BTreeSet<MintId> = BTreeSet::new();

/// Unordered mint pair; (A, B) and (B, A) map to the same key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PairKey(MintId, MintId);

impl PairKey {
    fn new(a: &MintId, b: &MintId) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }
}

/// Two markets chained through an intermediate mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoHopRoute {
    pub first: Arc<Market>,
    pub second: Arc<Market>,
}

impl TwoHopRoute {
    /// Same markets, traversed in the opposite direction
    pub fn mirrored(&self) -> Self {
        Self {
            first: Arc::clone(&self.second),
            second: Arc::clone(&self.first),
        }
    }
}

/// Undirected multigraph of mints and the markets connecting them
#[derive(Debug, Default)]
pub struct MarketGraph {
    neighbours: HashMap<MintId, BTreeSet<MintId>>,
    edges: HashMap<PairKey, Vec<Arc<Market>>>,
    market_ids: HashSet<MarketId>,
    two_hop_cache: DashMap<(MintId, MintId), Arc<Vec<TwoHopRoute>>>,
}

impl MarketGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_markets(markets: impl IntoIterator<Item = Arc<Market>>) -> Self {
        let mut graph = Self::new();
        for market in markets {
            graph.add_market(market);
        }
        graph
    }

    /// Register a market. Returns false if it was already known.
    pub fn add_market(&mut self, market: Arc<Market>) -> bool {
        if market.mint_a == market.mint_b || self.market_ids.contains(&market.id) {
            return false;
        }

        let (a, b) = (market.mint_a.clone(), market.mint_b.clone());
        self.neighbours.entry(a.clone()).or_default().insert(b.clone());
        self.neighbours.entry(b.clone()).or_default().insert(a.clone());
        self.market_ids.insert(market.id.clone());
        self.edges.entry(PairKey::new(&a, &b)).or_default().push(market);

        self.two_hop_cache.clear();
        true
    }

    pub fn get_neighbours(&self, mint: &MintId) -> &BTreeSet<MintId> {
        self.neighbours.get(mint).unwrap_or(&NO_NEIGHBOURS)
    }

    /// All markets listing the pair, in registration order
    pub fn get_markets(&self, a: &MintId, b: &MintId) -> &[Arc<Market>] {
        self.edges
            .get(&PairKey::new(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every (source, intermediate) x (intermediate, destination) market pair.
    /// The reverse direction is cached alongside as the mirror image.
    pub fn get_2hop_routes(&self, source: &MintId, destination: &MintId) -> Arc<Vec<TwoHopRoute>> {
        let key = (source.clone(), destination.clone());
        if let Some(cached) = self.two_hop_cache.get(&key) {
            return Arc::clone(cached.value());
        }

        let routes = self.enumerate_2hop(source, destination);
        let mirror: Vec<TwoHopRoute> = routes.iter().map(TwoHopRoute::mirrored).collect();
        debug!(
            "Enumerated {} 2-hop routes between {} and {}",
            routes.len(),
            source,
            destination
        );

        let routes = Arc::new(routes);
        self.two_hop_cache.insert(key, Arc::clone(&routes));
        self.two_hop_cache
            .insert((destination.clone(), source.clone()), Arc::new(mirror));
        routes
    }

    fn enumerate_2hop(&self, source: &MintId, destination: &MintId) -> Vec<TwoHopRoute> {
        let from_source = self.get_neighbours(source);
        let from_destination = self.get_neighbours(destination);
        let (smaller, larger) = if from_source.len() <= from_destination.len() {
            (from_source, from_destination)
        } else {
            (from_destination, from_source)
        };

        let mut routes = Vec::new();
        for intermediate in smaller.iter().filter(|m| larger.contains(*m)) {
            for first in self.get_markets(source, intermediate) {
                for second in self.get_markets(intermediate, destination) {
                    routes.push(TwoHopRoute {
                        first: Arc::clone(first),
                        second: Arc::clone(second),
                    });
                }
            }
        }
        routes
    }

    pub fn clear_route_cache(&self) {
        self.two_hop_cache.clear();
    }

    pub fn markets(&self) -> impl Iterator<Item = &Arc<Market>> {
        self.edges.values().flatten()
    }

    pub fn market_count(&self) -> usize {
        self.market_ids.len()
    }

    pub fn mint_count(&self) -> usize {
        self.neighbours.len()
    }
}
