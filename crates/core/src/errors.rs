//! Error types

use thiserror::Error;

use crate::MarketId;

/// Pool-wide faults. Any of these is fatal: quoting against a partial set of
/// replicas could mis-size a trade.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Worker {worker} exited: {reason}")]
    WorkerExited { worker: usize, reason: String },

    #[error("Worker pool is shut down")]
    Closed,

    #[error("Failed to spawn worker {worker}: {reason}")]
    Spawn { worker: usize, reason: String },
}

/// Route-local pricing failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Pool not found: {0}")]
    PoolNotFound(MarketId),

    #[error("Pool {0} not fully initialized")]
    PoolNotInitialized(MarketId),

    #[error("Insufficient liquidity in {0}")]
    InsufficientLiquidity(MarketId),

    #[error("Unpriceable on {market}: {reason}")]
    Unpriceable { market: MarketId, reason: String },

    #[error("Unexpected worker response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl QuoteError {
    /// Failures that are routine when the probe size exceeds a venue's range
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            QuoteError::InsufficientLiquidity(_) | QuoteError::Unpriceable { .. }
        )
    }

    /// Pool faults must terminate the search loop
    pub fn as_fatal(&self) -> Option<&PoolError> {
        match self {
            QuoteError::Pool(e) => Some(e),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias
pub type PoolResult<T> = Result<T, PoolError>;
pub type QuoteResult<T> = Result<T, QuoteError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
