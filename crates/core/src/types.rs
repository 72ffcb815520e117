//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token mint identifier (base58 public key)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MintId(String);

impl MintId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MintId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Market (pool) identifier, stable across worker replicas
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Supported venues
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DexLabel {
    Orca,
    OrcaWhirlpools,
    Raydium,
    RaydiumClmm,
    Other(String),
}

impl DexLabel {
    pub fn name(&self) -> &str {
        match self {
            DexLabel::Orca => "Orca",
            DexLabel::OrcaWhirlpools => "Orca (Whirlpools)",
            DexLabel::Raydium => "Raydium",
            DexLabel::RaydiumClmm => "Raydium CLMM",
            DexLabel::Other(name) => name,
        }
    }

    /// Concentrated-liquidity venues reject sizes that cross too many tick arrays
    pub fn is_concentrated(&self) -> bool {
        matches!(self, DexLabel::OrcaWhirlpools | DexLabel::RaydiumClmm)
    }
}

impl fmt::Display for DexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which way the observed trade moved the base asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeDirection {
    /// Base flowed into the pool: base is now cheap there
    SoldBase,
    /// Base flowed out of the pool: base is now expensive there
    BoughtBase,
}

/// Pipeline timing breadcrumbs, epoch milliseconds (0 = not reached)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    pub mempool_end: u64,
    pub pre_sim_end: u64,
    pub sim_end: u64,
    pub post_sim_end: u64,
    pub calc_arb_end: u64,
    pub build_bundle_end: u64,
    pub bundle_sent: u64,
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
