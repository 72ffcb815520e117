//! Worker threads and the request vocabulary they serve

use alloy_primitives::U256;
use crossbeam::channel::Receiver;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use backrun_core::{
    Market, MarketId, PoolError, Quote, QuoteError, QuoteParams, QuoteResult, RouteHopParams,
    SwapLeg, SwapParams,
};

use crate::oracle::QuoteOracle;

/// Message handled by a worker replica
#[derive(Debug, Clone)]
pub enum WorkerRequest<S> {
    AddPool {
        market: Arc<Market>,
        snapshot: S,
    },
    UpdatePool {
        market: MarketId,
        snapshot: S,
    },
    CalculateQuote {
        market: MarketId,
        params: QuoteParams,
    },
    CalculateRoute {
        amount: U256,
        hops: Vec<RouteHopParams>,
    },
    CalculateSwapLeg {
        market: MarketId,
        params: SwapParams,
    },
}

impl<S> WorkerRequest<S> {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequest::AddPool { .. } => "add_pool",
            WorkerRequest::UpdatePool { .. } => "update_pool",
            WorkerRequest::CalculateQuote { .. } => "calculate_quote",
            WorkerRequest::CalculateRoute { .. } => "calculate_route",
            WorkerRequest::CalculateSwapLeg { .. } => "calculate_swap_leg",
        }
    }
}

/// Reply to a [`WorkerRequest`], variant for variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResponse {
    AddPool {
        market: MarketId,
        accounts_for_update: Vec<String>,
    },
    UpdatePool {
        market: MarketId,
    },
    Quote(Quote),
    Route(Quote),
    SwapLeg(SwapLeg),
}

pub type TaskOutcome = QuoteResult<WorkerResponse>;

pub(crate) struct Job<S> {
    pub request: WorkerRequest<S>,
    pub reply: oneshot::Sender<TaskOutcome>,
}

pub(crate) enum WorkerEvent {
    Online(usize),
    Ready(usize),
    Exited { worker: usize, reason: String },
}

/// Reports the thread's exit to the dispatcher however the loop ends
struct ExitGuard {
    worker: usize,
    reason: Option<String>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let reason = self.reason.take().unwrap_or_else(|| {
            if std::thread::panicking() {
                "panicked".to_string()
            } else {
                "inbox closed".to_string()
            }
        });
        let _ = self.events.send(WorkerEvent::Exited {
            worker: self.worker,
            reason,
        });
    }
}

/// Body of a worker thread. Builds the replica, then serves one job at a
/// time until the inbox closes or a request panics.
pub(crate) fn run<O, F>(
    worker: usize,
    factory: Arc<F>,
    inbox: Receiver<Job<O::Snapshot>>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) where
    O: QuoteOracle,
    F: Fn(usize) -> O + Send + Sync + 'static,
{
    let mut guard = ExitGuard {
        worker,
        reason: None,
        events: events.clone(),
    };

    let mut oracle = factory(worker);
    info!("Worker {} online", worker);
    if events.send(WorkerEvent::Online(worker)).is_err() {
        return;
    }

    while let Ok(job) = inbox.recv() {
        let kind = job.request.kind();
        match panic::catch_unwind(AssertUnwindSafe(|| execute(&mut oracle, job.request))) {
            Ok(outcome) => {
                let _ = job.reply.send(outcome);
            }
            Err(payload) => {
                let reason = format!("panicked in {}: {}", kind, panic_message(&*payload));
                error!("Worker {} {}", worker, reason);
                let _ = job.reply.send(Err(QuoteError::Pool(PoolError::WorkerExited {
                    worker,
                    reason: reason.clone(),
                })));
                guard.reason = Some(reason);
                return;
            }
        }

        if events.send(WorkerEvent::Ready(worker)).is_err() {
            break;
        }
    }

    debug!("Worker {} stopping", worker);
}

fn execute<O: QuoteOracle>(oracle: &mut O, request: WorkerRequest<O::Snapshot>) -> TaskOutcome {
    match request {
        WorkerRequest::AddPool { market, snapshot } => {
            let accounts_for_update = oracle.add_pool(&market, snapshot)?;
            Ok(WorkerResponse::AddPool {
                market: market.id.clone(),
                accounts_for_update,
            })
        }
        WorkerRequest::UpdatePool { market, snapshot } => {
            oracle.update_pool(&market, snapshot)?;
            Ok(WorkerResponse::UpdatePool { market })
        }
        WorkerRequest::CalculateQuote { market, params } => {
            oracle.calculate_quote(&market, &params).map(WorkerResponse::Quote)
        }
        WorkerRequest::CalculateRoute { amount, hops } => {
            Ok(WorkerResponse::Route(oracle.calculate_route(amount, &hops)))
        }
        WorkerRequest::CalculateSwapLeg { market, params } => {
            oracle.calculate_swap_leg(&market, &params).map(WorkerResponse::SwapLeg)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
