//! Task and batch-outcome definitions for the dispatch engine.

use std::any::Any;
use std::sync::Arc;

/// A unit of work submitted to a [`Pool`](super::Pool) as part of a batch.
///
/// Tasks take no arguments and return nothing; they capture everything they
/// need. The caller owns them and may resubmit the same batch frame after
/// frame. Tasks within one batch must be independent of one another; the
/// engine makes no ordering or mutual-exclusion guarantees among them, and
/// does not check this.
pub type Task = Box<dyn Fn() + Send + Sync>;

/// Initialization hook invoked exactly once by each background worker thread,
/// before that thread processes any task.
///
/// CPU affinity and floating-point environment policy live entirely in the
/// hook; the engine only guarantees the call.
pub type WorkerInitHook = Arc<dyn Fn() + Send + Sync>;

/// Record of a single task that panicked during a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Index of the failed task within the submitted batch.
    pub task_index: usize,
    /// Panic message, when one could be extracted from the payload.
    pub message: String,
}

/// Result of one `run` call: which tasks, if any, panicked.
///
/// A failing task still counts as completed for barrier purposes; the outcome
/// is the only place its failure is surfaced to the caller.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    failures: Vec<TaskFailure>,
}

impl BatchOutcome {
    pub(super) fn from_failures(failures: Vec<TaskFailure>) -> Self {
        Self { failures }
    }

    /// Returns true when every task in the batch ran without panicking.
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// The tasks that panicked. Task 0's failure, if any, is always first;
    /// the rest appear in completion order.
    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }
}

/// Extracts a printable message from a panic payload.
pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked with a non-string payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_str_and_string_payloads() {
        let str_payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(str_payload.as_ref()), "static message");

        let string_payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(string_payload.as_ref()), "owned message");

        let opaque_payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(
            panic_message(opaque_payload.as_ref()),
            "task panicked with a non-string payload"
        );
    }

    #[test]
    fn empty_outcome_is_success() {
        let outcome = BatchOutcome::default();
        assert!(outcome.all_succeeded());
        assert!(outcome.failures().is_empty());
    }
}
