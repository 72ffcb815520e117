//! Overload-protection stages for the backrun pipeline
//!
//! Features:
//! - Rendezvous async queue (push producers, pull consumers)
//! - FIFO stage that sheds load past a high-water mark
//! - Priority stage that serves the best item first under load

pub mod queue;
pub mod backpressure;
pub mod priority;

pub use queue::{AsyncQueue, Buffer, Comparator, Fifo, PriorityBuffer};
pub use backpressure::{BackpressureStage, DropStage, StageStats};
pub use priority::PriorityStage;
