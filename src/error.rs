//! Error types for pool construction and reconfiguration.

use std::io;

use thiserror::Error;

/// Errors produced while constructing or reconfiguring the dispatch engine.
///
/// Nothing here is ever produced by `run` itself: a failing task is surfaced
/// through the batch outcome, and misuse of an otherwise healthy pool is a
/// programming error checked with debug assertions rather than a recoverable
/// condition.
#[derive(Debug, Error)]
pub enum Error {
    /// A pool was constructed with zero execution contexts. The pool never
    /// coerces this to 1; computing a sane degree from hardware data is the
    /// sizing policy's job.
    #[error("a pool requires at least one execution context")]
    ZeroParallelism,

    /// A parallelism degree outside the manager's supported range was
    /// requested.
    #[error("requested parallelism {requested} is outside the supported range 1..={max}")]
    InvalidParallelism {
        /// The degree that was asked for.
        requested: usize,
        /// The maximum degree computed at manager construction.
        max: usize,
    },

    /// An OS worker thread could not be spawned. Fatal for the construction
    /// that triggered it; already-spawned workers are joined before this is
    /// returned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] io::Error),
}
