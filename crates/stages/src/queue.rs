//! Rendezvous queue bridging push-style producers and pull-style consumers
//!
//! `put` hands an item straight to a parked consumer when there is one and
//! buffers it otherwise. The queue has no capacity limit of its own; the
//! stages built on top decide when to stop putting.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Storage discipline behind an [`AsyncQueue`]
pub trait Buffer<T>: Send {
    fn push(&mut self, item: T);
    fn pop(&mut self) -> Option<T>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First-in first-out buffer
#[derive(Debug)]
pub struct Fifo<T>(VecDeque<T>);

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self(VecDeque::new())
    }
}

impl<T: Send> Buffer<T> for Fifo<T> {
    fn push(&mut self, item: T) {
        self.0.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.0.pop_front()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// Caller-supplied ordering; `Greater` is served first
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

struct Ranked<T> {
    item: T,
    seq: u64,
    cmp: Comparator<T>,
}

impl<T> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Ranked<T> {}

impl<T> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ranked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // equal priority falls back to arrival order
        (self.cmp)(&self.item, &other.item).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Max-heap buffer ordered by a comparator
pub struct PriorityBuffer<T> {
    heap: BinaryHeap<Ranked<T>>,
    cmp: Comparator<T>,
    seq: u64,
}

impl<T> PriorityBuffer<T> {
    pub fn new(cmp: Comparator<T>) -> Self {
        Self {
            heap: BinaryHeap::new(),
            cmp,
            seq: 0,
        }
    }
}

impl<T: Send> Buffer<T> for PriorityBuffer<T> {
    fn push(&mut self, item: T) {
        self.seq += 1;
        self.heap.push(Ranked {
            item,
            seq: self.seq,
            cmp: Arc::clone(&self.cmp),
        });
    }

    fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|r| r.item)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

struct Inner<T, B> {
    buffer: B,
    waiters: VecDeque<oneshot::Sender<T>>,
    closed: bool,
    _item: PhantomData<fn() -> T>,
}

/// Single-producer/single-consumer async queue
pub struct AsyncQueue<T, B = Fifo<T>> {
    inner: Mutex<Inner<T, B>>,
}

impl<T: Send> AsyncQueue<T, Fifo<T>> {
    pub fn new() -> Self {
        Self::with_buffer(Fifo::default())
    }
}

impl<T: Send> Default for AsyncQueue<T, Fifo<T>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send, B: Buffer<T>> AsyncQueue<T, B> {
    pub fn with_buffer(buffer: B) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer,
                waiters: VecDeque::new(),
                closed: false,
                _item: PhantomData,
            }),
        }
    }

    /// Hand `item` to a waiting consumer, or buffer it
    pub fn put(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }

        let mut item = item;
        while let Some(waiter) = inner.waiters.pop_front() {
            // a consumer that gave up returns the item to us
            match waiter.send(item) {
                Ok(()) => return,
                Err(returned) => item = returned,
            }
        }
        inner.buffer.push(item);
    }

    /// Next buffered item, or wait for one. `None` once closed and drained.
    pub async fn get(&self) -> Option<T> {
        let rx = {
            let mut inner = self.inner.lock();
            if let Some(item) = inner.buffer.pop() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            rx
        };

        rx.await.ok()
    }

    /// Buffered items, excluding direct hand-offs
    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting items and release parked consumers; buffered items stay readable
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.waiters.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
