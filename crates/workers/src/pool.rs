//! Worker pool with a single-owner dispatcher
//!
//! All scheduling state (ready flags, the shared priority queue and the
//! per-worker queues) lives inside one dispatcher task. The pool handle and
//! the worker threads only talk to it through channels, so none of that
//! state is locked.

use alloy_primitives::U256;
use crossbeam::channel::{self, Sender};
use futures::future::join_all;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use backrun_core::{
    Market, MarketId, PoolError, PoolResult, Quote, QuoteError, QuoteParams, QuoteResult,
    RouteHopParams, SwapLeg, SwapParams, WorkerPoolConfig,
};

use crate::oracle::QuoteOracle;
use crate::worker::{self, Job, TaskOutcome, WorkerEvent, WorkerRequest, WorkerResponse};

/// Shared-queue priority tier; FIFO within a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TaskPriority {
    #[default]
    Normal,
    High,
}

const QUEUED: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Queued -> Started (dispatcher) or Queued -> Cancelled (caller timeout)
#[derive(Debug, Default)]
struct TaskState(AtomicU8);

impl TaskState {
    fn start(&self) -> bool {
        self.0
            .compare_exchange(QUEUED, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cancel(&self) -> bool {
        self.0
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct Task<S> {
    request: WorkerRequest<S>,
    reply: oneshot::Sender<TaskOutcome>,
    state: Arc<TaskState>,
}

struct Prioritized<S> {
    priority: TaskPriority,
    seq: u64,
    task: Task<S>,
}

impl<S> PartialEq for Prioritized<S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl<S> Eq for Prioritized<S> {}

impl<S> PartialOrd for Prioritized<S> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<S> Ord for Prioritized<S> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Command<S> {
    Submit { task: Task<S>, priority: TaskPriority },
    Broadcast(Vec<Task<S>>),
}

#[derive(Debug, Default)]
struct PoolCounters {
    dispatched: AtomicU64,
    timed_out: AtomicU64,
    broadcasts: AtomicU64,
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub dispatched: u64,
    pub timed_out: u64,
    pub broadcasts: u64,
}

/// Completion handle for one replica of a broadcast
pub struct TaskHandle {
    rx: oneshot::Receiver<TaskOutcome>,
    fatal: watch::Receiver<Option<PoolError>>,
}

impl TaskHandle {
    pub async fn outcome(self) -> TaskOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(current_fault(&self.fatal).into()),
        }
    }
}

fn current_fault(fatal: &watch::Receiver<Option<PoolError>>) -> PoolError {
    fatal.borrow().clone().unwrap_or(PoolError::Closed)
}

/// N long-lived quote workers, each with a private oracle replica
pub struct WorkerPool<O: QuoteOracle> {
    size: usize,
    commands: mpsc::UnboundedSender<Command<O::Snapshot>>,
    fatal: watch::Receiver<Option<PoolError>>,
    counters: Arc<PoolCounters>,
    dispatcher: JoinHandle<()>,
}

impl<O: QuoteOracle> WorkerPool<O> {
    /// Start `config.num_worker_threads` threads, each owning `factory(worker_id)`,
    /// and wait until all of them are online
    pub async fn spawn<F>(config: &WorkerPoolConfig, factory: F) -> PoolResult<Self>
    where
        F: Fn(usize) -> O + Send + Sync + 'static,
    {
        let size = config.num_worker_threads.max(1);
        let factory = Arc::new(factory);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut inboxes = Vec::with_capacity(size);

        for id in 0..size {
            let (tx, rx) = channel::unbounded::<Job<O::Snapshot>>();
            let factory = Arc::clone(&factory);
            let events = events_tx.clone();
            std::thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, id))
                .spawn(move || worker::run::<O, F>(id, factory, rx, events))
                .map_err(|e| PoolError::Spawn {
                    worker: id,
                    reason: e.to_string(),
                })?;
            inboxes.push(tx);
        }
        drop(events_tx);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (fatal_tx, fatal_rx) = watch::channel(None);
        let (online_tx, online_rx) = oneshot::channel();
        let counters = Arc::new(PoolCounters::default());

        let dispatcher = Dispatcher {
            ready: vec![false; size],
            shared: BinaryHeap::new(),
            per_worker: (0..size).map(|_| VecDeque::new()).collect(),
            inboxes,
            seq: 0,
            online: 0,
            online_tx: Some(online_tx),
            fatal: fatal_tx,
            counters: Arc::clone(&counters),
        };
        let dispatcher = tokio::spawn(dispatcher.run(commands_rx, events_rx));

        let pool = Self {
            size,
            commands: commands_tx,
            fatal: fatal_rx,
            counters,
            dispatcher,
        };

        if online_rx.await.is_err() {
            return Err(pool.fault());
        }
        info!("Worker pool ready with {} workers", size);
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run on whichever worker frees up first.
    ///
    /// `Ok(None)` when `timeout` elapses before any worker picks the task
    /// up. Once started, a task always runs to completion.
    pub async fn run_task(
        &self,
        request: WorkerRequest<O::Snapshot>,
        timeout: Option<Duration>,
        priority: TaskPriority,
    ) -> QuoteResult<Option<WorkerResponse>> {
        self.check_healthy()?;

        let (reply, mut rx) = oneshot::channel();
        let state = Arc::new(TaskState::default());
        let task = Task {
            request,
            reply,
            state: Arc::clone(&state),
        };
        self.send(Command::Submit { task, priority })?;

        let Some(limit) = timeout else {
            return self.settle(rx.await).map(Some);
        };

        tokio::select! {
            res = &mut rx => self.settle(res).map(Some),
            _ = tokio::time::sleep(limit) => {
                if state.cancel() {
                    self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                    debug!("Task timed out after {:?} before a worker was free", limit);
                    Ok(None)
                } else {
                    // already running
                    self.settle(rx.await).map(Some)
                }
            }
        }
    }

    /// Queue an independent copy of `request` on every worker's own queue
    pub fn run_task_on_all_workers(
        &self,
        request: WorkerRequest<O::Snapshot>,
    ) -> PoolResult<Vec<TaskHandle>> {
        self.check_healthy()?;

        let mut tasks = Vec::with_capacity(self.size);
        let mut handles = Vec::with_capacity(self.size);
        for _ in 0..self.size {
            let (reply, rx) = oneshot::channel();
            tasks.push(Task {
                request: request.clone(),
                reply,
                state: Arc::new(TaskState::default()),
            });
            handles.push(TaskHandle {
                rx,
                fatal: self.fatal.clone(),
            });
        }

        self.send(Command::Broadcast(tasks))?;
        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        Ok(handles)
    }

    /// Register a market on every replica; returns the accounts it needs updates for
    pub async fn add_pool(
        &self,
        market: Arc<Market>,
        snapshot: O::Snapshot,
    ) -> QuoteResult<Vec<String>> {
        let id = market.id.clone();
        let handles = self.run_task_on_all_workers(WorkerRequest::AddPool { market, snapshot })?;
        let outcomes = join_all(handles.into_iter().map(TaskHandle::outcome)).await;

        let mut accounts = None;
        for outcome in outcomes {
            match outcome? {
                WorkerResponse::AddPool {
                    accounts_for_update,
                    ..
                } => {
                    accounts.get_or_insert(accounts_for_update);
                }
                other => return Err(unexpected("add_pool", &other)),
            }
        }
        debug!("Added pool {} to {} workers", id, self.size);
        Ok(accounts.unwrap_or_default())
    }

    /// Propagate a state update to every replica. Replica-level failures are
    /// logged; only pool faults are returned. Returns the replicas updated.
    pub async fn update_pool(&self, market: MarketId, snapshot: O::Snapshot) -> PoolResult<usize> {
        let handles = self.run_task_on_all_workers(WorkerRequest::UpdatePool {
            market: market.clone(),
            snapshot,
        })?;
        let outcomes = join_all(handles.into_iter().map(TaskHandle::outcome)).await;

        let mut updated = 0;
        for outcome in outcomes {
            match outcome {
                Ok(_) => updated += 1,
                Err(QuoteError::Pool(e)) => return Err(e),
                Err(e) => warn!("Error updating pool {}: {}", market, e),
            }
        }
        Ok(updated)
    }

    pub async fn calculate_quote(
        &self,
        market: &MarketId,
        params: QuoteParams,
        timeout: Option<Duration>,
    ) -> QuoteResult<Option<Quote>> {
        let request = WorkerRequest::CalculateQuote {
            market: market.clone(),
            params,
        };
        match self.run_task(request, timeout, TaskPriority::Normal).await? {
            None => Ok(None),
            Some(WorkerResponse::Quote(quote)) => Ok(Some(quote)),
            Some(other) => Err(unexpected("calculate_quote", &other)),
        }
    }

    pub async fn calculate_route(
        &self,
        amount: U256,
        hops: Vec<RouteHopParams>,
        timeout: Option<Duration>,
    ) -> QuoteResult<Option<Quote>> {
        let request = WorkerRequest::CalculateRoute { amount, hops };
        match self.run_task(request, timeout, TaskPriority::Normal).await? {
            None => Ok(None),
            Some(WorkerResponse::Route(quote)) => Ok(Some(quote)),
            Some(other) => Err(unexpected("calculate_route", &other)),
        }
    }

    /// Bundle-building path; jumps the search traffic
    pub async fn calculate_swap_leg(
        &self,
        market: &MarketId,
        params: SwapParams,
    ) -> QuoteResult<SwapLeg> {
        let request = WorkerRequest::CalculateSwapLeg {
            market: market.clone(),
            params,
        };
        match self.run_task(request, None, TaskPriority::High).await? {
            Some(WorkerResponse::SwapLeg(leg)) => Ok(leg),
            Some(other) => Err(unexpected("calculate_swap_leg", &other)),
            None => Err(QuoteError::UnexpectedResponse(
                "calculate_swap_leg returned no result".into(),
            )),
        }
    }

    /// Resolves with the fault once any worker exits
    pub async fn failed(&self) -> PoolError {
        let mut fatal = self.fatal.clone();
        let result = fatal.wait_for(Option::is_some).await;
        match result {
            Ok(fault) => fault.clone().unwrap_or(PoolError::Closed),
            Err(_) => PoolError::Closed,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.fatal.borrow().is_none()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.size,
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
        }
    }

    fn check_healthy(&self) -> PoolResult<()> {
        match self.fatal.borrow().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn send(&self, command: Command<O::Snapshot>) -> PoolResult<()> {
        self.commands.send(command).map_err(|_| self.fault())
    }

    fn settle(&self, res: Result<TaskOutcome, oneshot::error::RecvError>) -> QuoteResult<WorkerResponse> {
        match res {
            Ok(outcome) => outcome,
            Err(_) => Err(self.fault().into()),
        }
    }

    fn fault(&self) -> PoolError {
        current_fault(&self.fatal)
    }
}

impl<O: QuoteOracle> Drop for WorkerPool<O> {
    fn drop(&mut self) {
        // closing the inboxes lets the threads exit on their own
        self.dispatcher.abort();
    }
}

fn unexpected(operation: &str, response: &WorkerResponse) -> QuoteError {
    QuoteError::UnexpectedResponse(format!("{} got {:?}", operation, response))
}

struct Dispatcher<S> {
    ready: Vec<bool>,
    shared: BinaryHeap<Prioritized<S>>,
    per_worker: Vec<VecDeque<Task<S>>>,
    inboxes: Vec<Sender<Job<S>>>,
    seq: u64,
    online: usize,
    online_tx: Option<oneshot::Sender<()>>,
    fatal: watch::Sender<Option<PoolError>>,
    counters: Arc<PoolCounters>,
}

impl<S: Send + 'static> Dispatcher<S> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<S>>,
        mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.on_event(event),
            }
        }
        debug!("Dispatcher stopped");
    }

    fn is_faulted(&self) -> bool {
        self.fatal.borrow().is_some()
    }

    fn on_command(&mut self, command: Command<S>) {
        if let Some(fault) = self.fatal.borrow().clone() {
            let tasks = match command {
                Command::Submit { task, .. } => vec![task],
                Command::Broadcast(tasks) => tasks,
            };
            for task in tasks {
                let _ = task.reply.send(Err(fault.clone().into()));
            }
            return;
        }

        match command {
            Command::Submit { task, priority } => {
                self.seq += 1;
                self.shared.push(Prioritized {
                    priority,
                    seq: self.seq,
                    task,
                });
            }
            Command::Broadcast(tasks) => {
                for (queue, task) in self.per_worker.iter_mut().zip(tasks) {
                    queue.push_back(task);
                }
            }
        }
        self.drain();
    }

    fn on_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Online(worker) => {
                self.online += 1;
                if self.online == self.ready.len() {
                    if let Some(tx) = self.online_tx.take() {
                        let _ = tx.send(());
                    }
                }
                self.on_ready(worker);
            }
            WorkerEvent::Ready(worker) => self.on_ready(worker),
            WorkerEvent::Exited { worker, reason } => {
                self.on_fault(PoolError::WorkerExited { worker, reason });
            }
        }
    }

    fn on_ready(&mut self, worker: usize) {
        if self.is_faulted() {
            return;
        }
        self.ready[worker] = true;
        self.dispatch(worker);
    }

    fn drain(&mut self) {
        for worker in 0..self.ready.len() {
            if self.ready[worker] {
                self.dispatch(worker);
            }
        }
    }

    /// Hand the next runnable task to `worker`. Which queue is checked first
    /// is a coin flip so neither can starve the other.
    fn dispatch(&mut self, worker: usize) {
        let task = if rand::random::<bool>() {
            self.pop_shared().or_else(|| self.pop_own(worker))
        } else {
            self.pop_own(worker).or_else(|| self.pop_shared())
        };
        let Some(task) = task else {
            return;
        };

        self.ready[worker] = false;
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let job = Job {
            request: task.request,
            reply: task.reply,
        };
        if let Err(channel::SendError(job)) = self.inboxes[worker].send(job) {
            let fault = PoolError::WorkerExited {
                worker,
                reason: "inbox disconnected".into(),
            };
            let _ = job.reply.send(Err(fault.clone().into()));
            self.on_fault(fault);
        }
    }

    fn pop_shared(&mut self) -> Option<Task<S>> {
        while let Some(entry) = self.shared.pop() {
            // cancelled tasks are discarded lazily
            if entry.task.state.start() {
                return Some(entry.task);
            }
        }
        None
    }

    fn pop_own(&mut self, worker: usize) -> Option<Task<S>> {
        let queue = &mut self.per_worker[worker];
        while let Some(task) = queue.pop_front() {
            if task.state.start() {
                return Some(task);
            }
        }
        None
    }

    fn on_fault(&mut self, fault: PoolError) {
        if self.is_faulted() {
            return;
        }
        error!("Worker pool failed: {}", fault);
        self.fatal.send_replace(Some(fault.clone()));
        // spawn() is waiting on this
        self.online_tx.take();

        for entry in self.shared.drain() {
            let _ = entry.task.reply.send(Err(fault.clone().into()));
        }
        for queue in &mut self.per_worker {
            for task in queue.drain(..) {
                let _ = task.reply.send(Err(fault.clone().into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_product::{ConstantProductOracle, Reserves};
    use backrun_core::{DexLabel, MintId, SOL_MINT, USDC_MINT};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Oracle whose quotes sleep; an amount of 999 panics
    #[derive(Default)]
    struct SlowOracle {
        delay: Duration,
        served: Arc<Mutex<Vec<usize>>>,
        id: usize,
    }

    impl QuoteOracle for SlowOracle {
        type Snapshot = ();

        fn add_pool(&mut self, _market: &Market, _snapshot: ()) -> QuoteResult<Vec<String>> {
            Ok(vec![format!("replica-{}", self.id)])
        }

        fn update_pool(&mut self, market: &MarketId, _snapshot: ()) -> QuoteResult<()> {
            if self.id == 1 {
                return Err(QuoteError::PoolNotFound(market.clone()));
            }
            Ok(())
        }

        fn calculate_quote(&self, _market: &MarketId, params: &QuoteParams) -> QuoteResult<Quote> {
            if params.amount == U256::from(999u64) {
                panic!("corrupted replica");
            }
            std::thread::sleep(self.delay);
            self.served.lock().unwrap().push(self.id);
            Ok(Quote::new(params.amount, params.amount))
        }

        fn calculate_swap_leg(&self, market: &MarketId, params: &SwapParams) -> QuoteResult<SwapLeg> {
            Ok(SwapLeg {
                market: market.clone(),
                source_mint: params.source_mint.clone(),
                destination_mint: params.destination_mint.clone(),
                in_amount: params.in_amount,
                minimum_out_amount: params.minimum_out_amount,
                accounts: vec![],
            })
        }
    }

    fn config(n: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            num_worker_threads: n,
            ..Default::default()
        }
    }

    async fn slow_pool(n: usize, delay: Duration) -> (WorkerPool<SlowOracle>, Arc<Mutex<Vec<usize>>>) {
        let served = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&served);
        let pool = WorkerPool::spawn(&config(n), move |id| SlowOracle {
            delay,
            served: Arc::clone(&shared),
            id,
        })
        .await
        .unwrap();
        (pool, served)
    }

    fn params(amount: u64) -> QuoteParams {
        QuoteParams::exact_in(MintId::from(SOL_MINT), MintId::from(USDC_MINT), U256::from(amount))
    }

    #[tokio::test]
    async fn test_quote_roundtrip() {
        let (pool, served) = slow_pool(2, Duration::ZERO).await;
        let quote = pool
            .calculate_quote(&MarketId::from("m"), params(42), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(quote.out_amount, U256::from(42u64));
        assert_eq!(served.lock().unwrap().len(), 1);
        assert_eq!(pool.stats().dispatched, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_resolves_to_none_without_blocking_others() {
        let (pool, served) = slow_pool(2, Duration::from_millis(150)).await;
        let pool = Arc::new(pool);
        let market = MarketId::from("m");

        // four tasks without a timeout keep both workers busy
        let busy: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                let market = market.clone();
                tokio::spawn(async move { pool.calculate_quote(&market, params(i), None).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        let timed = pool
            .calculate_quote(&market, params(100), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(timed.is_none());
        assert!(elapsed < Duration::from_millis(140), "took {:?}", elapsed);
        assert_eq!(pool.stats().timed_out, 1);

        for handle in busy {
            assert!(handle.await.unwrap().unwrap().is_some());
        }
        // the cancelled task never ran
        assert_eq!(served.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_worker() {
        let (pool, _) = slow_pool(3, Duration::ZERO).await;
        let market = Arc::new(Market::new(
            "m",
            MintId::from(SOL_MINT),
            MintId::from(USDC_MINT),
            DexLabel::Orca,
        ));

        let handles = pool
            .run_task_on_all_workers(WorkerRequest::AddPool {
                market,
                snapshot: (),
            })
            .unwrap();
        assert_eq!(handles.len(), 3);

        let mut replicas = Vec::new();
        for handle in handles {
            match handle.outcome().await.unwrap() {
                WorkerResponse::AddPool {
                    accounts_for_update,
                    ..
                } => replicas.extend(accounts_for_update),
                other => panic!("unexpected {:?}", other),
            }
        }
        replicas.sort();
        assert_eq!(replicas, vec!["replica-0", "replica-1", "replica-2"]);
    }

    #[tokio::test]
    async fn test_update_pool_counts_replicas() {
        let (pool, _) = slow_pool(3, Duration::ZERO).await;
        // replica 1 rejects the update; logged, not returned
        let updated = pool.update_pool(MarketId::from("m"), ()).await.unwrap();
        assert_eq!(updated, 2);
    }

    #[tokio::test]
    async fn test_high_priority_served_first() {
        let (pool, served) = slow_pool(1, Duration::from_millis(30)).await;
        let pool = Arc::new(pool);
        let market = MarketId::from("m");

        // occupy the only worker
        let first = {
            let pool = Arc::clone(&pool);
            let market = market.clone();
            tokio::spawn(async move { pool.calculate_quote(&market, params(1), None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let normal = {
            let pool = Arc::clone(&pool);
            let market = market.clone();
            tokio::spawn(async move {
                pool.run_task(
                    WorkerRequest::CalculateQuote { market, params: params(2) },
                    None,
                    TaskPriority::Normal,
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let high = pool
            .run_task(
                WorkerRequest::CalculateQuote {
                    market: market.clone(),
                    params: params(3),
                },
                None,
                TaskPriority::High,
            )
            .await
            .unwrap();

        // the high priority task finished while the normal one was still queued
        assert!(high.is_some());
        assert!(!normal.is_finished());

        first.await.unwrap().unwrap();
        normal.await.unwrap().unwrap();
        assert_eq!(served.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_worker_panic_is_fatal() {
        let (pool, _) = slow_pool(2, Duration::ZERO).await;
        let market = MarketId::from("m");

        let err = pool.calculate_quote(&market, params(999), None).await.unwrap_err();
        assert!(matches!(
            err.as_fatal(),
            Some(PoolError::WorkerExited { .. })
        ));

        let fault = tokio::time::timeout(Duration::from_secs(1), pool.failed())
            .await
            .unwrap();
        assert!(matches!(fault, PoolError::WorkerExited { .. }));
        assert!(!pool.is_healthy());

        // every later dispatch fails fast
        let later = pool.calculate_quote(&market, params(1), None).await.unwrap_err();
        assert!(later.as_fatal().is_some());
        assert!(pool.run_task_on_all_workers(WorkerRequest::UpdatePool {
            market,
            snapshot: (),
        })
        .is_err());
    }

    #[tokio::test]
    async fn test_constant_product_replicas_stay_in_sync() {
        let pool = WorkerPool::spawn(&config(2), |_| ConstantProductOracle::new())
            .await
            .unwrap();
        let market = Arc::new(Market::new(
            "m",
            MintId::from(SOL_MINT),
            MintId::from(USDC_MINT),
            DexLabel::Raydium,
        ));
        pool.add_pool(Arc::clone(&market), Reserves::new(1_000_000, 1_000_000, 30))
            .await
            .unwrap();
        pool.update_pool(market.id.clone(), Reserves::new(1_000_000, 2_000_000, 30))
            .await
            .unwrap();

        // whichever replica serves it, the quote reflects the update
        for _ in 0..4 {
            let quote = pool
                .calculate_quote(&market.id, params(1000), None)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(quote.out_amount, U256::from(1992u64));
        }
    }

    async fn constant_product_pool() -> (WorkerPool<ConstantProductOracle>, Arc<Market>) {
        let pool = WorkerPool::spawn(&config(2), |_| ConstantProductOracle::new())
            .await
            .unwrap();
        let mut market = Market::new(
            "m",
            MintId::from(SOL_MINT),
            MintId::from(USDC_MINT),
            DexLabel::Orca,
        );
        market.vault_a = Some("vault-a".into());
        market.vault_b = Some("vault-b".into());
        let market = Arc::new(market);
        pool.add_pool(Arc::clone(&market), Reserves::new(1_000_000, 1_000_000, 30))
            .await
            .unwrap();
        (pool, market)
    }

    fn hop(market: &str, source: &str, destination: &str) -> RouteHopParams {
        RouteHopParams {
            market: MarketId::from(market),
            source_mint: MintId::from(source),
            destination_mint: MintId::from(destination),
        }
    }

    #[tokio::test]
    async fn test_route_roundtrip() {
        let (pool, _) = constant_product_pool().await;
        let amount = U256::from(1000u64);

        let single = pool
            .calculate_route(amount, vec![hop("m", SOL_MINT, USDC_MINT)], None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(single.in_amount, amount);
        assert_eq!(single.out_amount, U256::from(996u64));

        // out and back through the same pool pays the fee twice
        let cycle = pool
            .calculate_route(
                amount,
                vec![hop("m", SOL_MINT, USDC_MINT), hop("m", USDC_MINT, SOL_MINT)],
                None,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cycle.out_amount, U256::from(992u64));

        let broken = pool
            .calculate_route(
                amount,
                vec![hop("m", SOL_MINT, USDC_MINT), hop("missing", USDC_MINT, SOL_MINT)],
                Some(Duration::from_secs(1)),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(broken.in_amount, amount);
        assert!(broken.is_unpriceable());
    }

    #[tokio::test]
    async fn test_swap_leg_roundtrip() {
        let (pool, market) = constant_product_pool().await;
        let params = SwapParams {
            source_mint: MintId::from(USDC_MINT),
            destination_mint: MintId::from(SOL_MINT),
            in_amount: U256::from(5u64),
            minimum_out_amount: U256::from(1u64),
            user_transfer_authority: "payer".into(),
        };

        let leg = pool.calculate_swap_leg(&market.id, params.clone()).await.unwrap();
        assert_eq!(leg.market, market.id);
        assert_eq!(leg.source_mint, params.source_mint);
        assert_eq!(leg.destination_mint, params.destination_mint);
        assert_eq!(leg.in_amount, U256::from(5u64));
        assert_eq!(leg.minimum_out_amount, U256::from(1u64));
        assert_eq!(leg.accounts, vec!["m", "vault-a", "vault-b", "payer"]);

        let err = pool
            .calculate_swap_leg(&MarketId::from("missing"), params)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::PoolNotFound(_)));
        assert!(pool.is_healthy());
    }

    #[tokio::test]
    async fn test_swap_leg_jumps_queued_quotes() {
        let (pool, served) = slow_pool(1, Duration::from_millis(30)).await;
        let pool = Arc::new(pool);
        let market = MarketId::from("m");

        let first = {
            let pool = Arc::clone(&pool);
            let market = market.clone();
            tokio::spawn(async move { pool.calculate_quote(&market, params(1), None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let queued = {
            let pool = Arc::clone(&pool);
            let market = market.clone();
            tokio::spawn(async move { pool.calculate_quote(&market, params(2), None).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let leg = pool
            .calculate_swap_leg(
                &market,
                SwapParams {
                    source_mint: MintId::from(SOL_MINT),
                    destination_mint: MintId::from(USDC_MINT),
                    in_amount: U256::from(7u64),
                    minimum_out_amount: U256::ZERO,
                    user_transfer_authority: "payer".into(),
                },
            )
            .await
            .unwrap();

        // served right after the running quote, ahead of the queued one
        assert_eq!(leg.in_amount, U256::from(7u64));
        assert!(!queued.is_finished());
        assert_eq!(served.lock().unwrap().len(), 1);

        first.await.unwrap().unwrap();
        queued.await.unwrap().unwrap();
        assert_eq!(served.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_task_state_transitions() {
        let state = TaskState::default();
        assert!(state.cancel());
        assert!(!state.start());

        let state = TaskState::default();
        assert!(state.start());
        assert!(!state.cancel());
    }
}
