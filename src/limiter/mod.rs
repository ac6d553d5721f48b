//! Concurrency limiting for transformation work.
//!
//! A fixed number of tasks run at once, a bounded FIFO queue absorbs
//! bursts, and everything beyond that is shed.

pub mod task_limiter;

pub use task_limiter::*;
