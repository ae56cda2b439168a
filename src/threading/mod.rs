//! Fork-join task dispatch for the per-frame simulation update.
//!
//! This module provides a barrier-synchronized worker pool re-armed every
//! frame, plus the policy layer that sizes it. It includes:
//!
//! - `Pool`: fixed set of long-lived workers executing one batch per `run`
//! - `PoolManager`: owns the live pool and the parallelism configuration
//! - `SizingPolicy` / `RenderAwareSizing`: injected parallelism policy
//! - `HardwareEnvironment`: explicitly constructed hardware info
//! - `TaskThread`: serial companion thread for queue-and-forget work

mod environment;
mod manager;
mod pool;
mod task;
mod task_thread;
mod worker;

// Re-export public API
pub use environment::HardwareEnvironment;
pub use manager::{PoolManager, RenderAwareSizing, SizingPolicy};
pub use pool::Pool;
pub use task::{BatchOutcome, Task, TaskFailure, WorkerInitHook};
pub use task_thread::{TaskCompletionIndicator, TaskThread};
