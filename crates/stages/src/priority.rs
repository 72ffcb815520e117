//! Priority stage: same drop discipline as the FIFO stage, but buffered in a
//! heap so that under load the best item (e.g. the largest trade) is served
//! first rather than the oldest.

use futures::Stream;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::backpressure::DropStage;
use crate::queue::PriorityBuffer;

pub type PriorityStage<T> = DropStage<T, PriorityBuffer<T>>;

impl<T: Send + 'static> DropStage<T, PriorityBuffer<T>> {
    /// `comparator(a, b) == Greater` means `a` is served before `b`
    pub fn spawn<S, F>(source: S, comparator: F, high_water_mark: usize, name: impl Into<String>) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        let buffer = PriorityBuffer::new(Arc::new(comparator));
        Self::spawn_with_buffer(source, buffer, high_water_mark, name)
    }
}
