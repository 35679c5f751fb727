//! # rivroute parallel
//!
//! Execution strategies for the routing sweep.
//!
//! A sweep is a sequence of batches separated by barriers. Pixels inside one
//! batch are independent, so a batch is mapped in parallel over contiguous
//! chunks of its index slice and joined before the next batch starts.
//! Without the `parallel` feature every batch runs on the calling thread.

pub mod strategy;

pub use strategy::{available_workers, BatchExecutor, ParallelStrategy, PoolError, ProcessingMode};
