//! Quote worker pool
//!
//! Features:
//! - Long-lived worker threads, each owning a private pricing replica
//! - Shared priority queue plus per-worker broadcast queues
//! - Timeout-cancellable tasks that resolve to "no result"
//! - Fail-fast on any worker exit

pub mod oracle;
pub mod constant_product;
pub mod worker;
pub mod pool;

pub use oracle::QuoteOracle;
pub use constant_product::{ConstantProductOracle, Reserves};
pub use worker::{TaskOutcome, WorkerRequest, WorkerResponse};
pub use pool::{PoolStats, TaskHandle, TaskPriority, WorkerPool};
