//! Lossy pipeline stages
//!
//! A stage drains its source in a background task so the upstream producer
//! never stalls. Items are forwarded into an [`AsyncQueue`] only while its
//! occupancy is below the high-water mark; past that they are dropped and
//! counted. Dropped items are never retried: upstream data is transient
//! market state.

use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::queue::{AsyncQueue, Buffer, Fifo};

/// Background-fed stage over any buffer discipline
pub struct DropStage<T, B> {
    name: String,
    high_water_mark: usize,
    queue: Arc<AsyncQueue<T, B>>,
    counters: Arc<StageCounters>,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct StageCounters {
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

/// FIFO stage
pub type BackpressureStage<T> = DropStage<T, Fifo<T>>;

impl<T: Send + 'static> DropStage<T, Fifo<T>> {
    pub fn spawn<S>(source: S, high_water_mark: usize, name: impl Into<String>) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self::spawn_with_buffer(source, Fifo::default(), high_water_mark, name)
    }
}

impl<T, B> DropStage<T, B>
where
    T: Send + 'static,
    B: Buffer<T> + 'static,
{
    pub fn spawn_with_buffer<S>(
        source: S,
        buffer: B,
        high_water_mark: usize,
        name: impl Into<String>,
    ) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let name = name.into();
        let queue = Arc::new(AsyncQueue::with_buffer(buffer));
        let counters = Arc::new(StageCounters::default());

        let handle = tokio::spawn(consume(
            source,
            Arc::clone(&queue),
            Arc::clone(&counters),
            high_water_mark,
            name.clone(),
        ));

        Self {
            name,
            high_water_mark,
            queue,
            counters,
            handle,
        }
    }

    /// Next item, waiting if none is buffered. `None` once the source is exhausted and drained.
    pub async fn next(&self) -> Option<T> {
        self.queue.get().await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> StageStats {
        StageStats {
            buffered: self.queue.len(),
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            high_water_mark: self.high_water_mark,
            source_done: self.handle.is_finished(),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |stage| async move {
            let item = stage.next().await?;
            Some((item, stage))
        })
    }
}

impl<T, B> Drop for DropStage<T, B> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn consume<T, B, S>(
    source: S,
    queue: Arc<AsyncQueue<T, B>>,
    counters: Arc<StageCounters>,
    high_water_mark: usize,
    name: String,
) where
    T: Send,
    B: Buffer<T>,
    S: Stream<Item = T> + Send,
{
    let mut source = Box::pin(source);

    while let Some(item) = source.next().await {
        if queue.len() < high_water_mark {
            queue.put(item);
            counters.forwarded.fetch_add(1, Ordering::Relaxed);
        } else {
            let dropped = counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                stage = %name,
                high_water_mark,
                dropped,
                "High water mark reached, dropping item"
            );
        }
    }

    debug!(stage = %name, "Source exhausted");
    queue.close();
}

/// Stage statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStats {
    pub buffered: usize,
    pub forwarded: u64,
    pub dropped: u64,
    pub high_water_mark: usize,
    pub source_done: bool,
}
