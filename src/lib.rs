//! Fixed-size fork-join worker pool for per-frame simulation workloads.
//!
//! A large particle simulation updates its physics every frame as a batch of
//! independent, CPU-bound tasks. This crate dispatches such batches over a
//! fixed set of long-lived worker threads: `run` enqueues the batch, keeps
//! the calling thread working alongside the pool, and returns once every
//! task has completed. It is a fork-join barrier re-armed each frame, with
//! no thread creation in the steady state.

pub mod error;
pub mod threading;

pub use error::Error;
pub use threading::{
    BatchOutcome, HardwareEnvironment, Pool, PoolManager, RenderAwareSizing, SizingPolicy, Task,
    TaskCompletionIndicator, TaskFailure, TaskThread, WorkerInitHook,
};
