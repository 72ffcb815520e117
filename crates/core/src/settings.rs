//! Configuration types, loaded with the `config` crate

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{default_base_mints, BaseMint, ConfigError, ConfigResult, SOLEND_FLASHLOAN_FEE_BPS};

/// Environment prefix, e.g. `BACKRUN__ENGINE__ARB_CALCULATION_NUM_STEPS=30`
pub const ENV_PREFIX: &str = "BACKRUN";

/// Arb search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of size steps (K) probed per trade
    pub arb_calculation_num_steps: u32,
    /// Wall-clock budget for one trade's size search
    pub max_arb_calculation_time_ms: u64,
    /// Trades older than this (from first observation) are skipped
    pub max_trade_age_ms: u64,
    pub flashloan_fee_bps: u16,
    pub shuffle_three_hop_routes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arb_calculation_num_steps: 20,
            max_arb_calculation_time_ms: 50,
            max_trade_age_ms: 500,
            flashloan_fee_bps: SOLEND_FLASHLOAN_FEE_BPS,
            shuffle_three_hop_routes: true,
        }
    }
}

impl EngineConfig {
    pub fn max_calculation_time(&self) -> Duration {
        Duration::from_millis(self.max_arb_calculation_time_ms)
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of long-lived quote workers (N)
    pub num_worker_threads: usize,
    /// Thread name prefix, suffixed with the worker id
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_worker_threads: 4,
            thread_name: "amm-calc".to_string(),
        }
    }
}

/// High-water marks for the lossy pipeline stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub trade_high_water_mark: usize,
    pub idea_high_water_mark: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            trade_high_water_mark: 100,
            idea_high_water_mark: 100,
        }
    }
}

/// Upstream/downstream wiring of the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// JSON array of market seeds registered at startup
    pub markets_path: PathBuf,
    pub log_json: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            markets_path: PathBuf::from("markets.json"),
            log_json: false,
        }
    }
}

/// Complete bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub engine: EngineConfig,
    pub workers: WorkerPoolConfig,
    pub stages: StageConfig,
    pub base_mints: Vec<BaseMint>,
    pub feed: FeedConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            workers: WorkerPoolConfig::default(),
            stages: StageConfig::default(),
            base_mints: default_base_mints(),
            feed: FeedConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load from an optional config file, then `BACKRUN__*` environment overrides
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: BotConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.arb_calculation_num_steps == 0 {
            return Err(ConfigError::Invalid(
                "engine.arb_calculation_num_steps must be at least 1".into(),
            ));
        }
        if self.workers.num_worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "workers.num_worker_threads must be at least 1".into(),
            ));
        }
        if self.stages.trade_high_water_mark == 0 || self.stages.idea_high_water_mark == 0 {
            return Err(ConfigError::Invalid("high water marks must be positive".into()));
        }
        if self.engine.flashloan_fee_bps > 10_000 {
            return Err(ConfigError::Invalid(format!(
                "engine.flashloan_fee_bps {} exceeds 100%",
                self.engine.flashloan_fee_bps
            )));
        }
        Ok(())
    }
}
