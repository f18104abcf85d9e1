//! Generic chunk-parallel evaluation framework.
//!
//! Provides the worker pool every parallel analysis in the crate runs on: a
//! single producer feeds a bounded job queue, a fixed number of workers fold
//! jobs into private summaries, and the collecting thread merges them.

mod worker_pool;

pub use worker_pool::{EvaluationResult, FrameworkError, JobProcessor, PoolConfig, WorkerPool};
