//! The background worker loop and the drain algorithm it shares with the
//! thread blocked in `run`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::pool::Shared;
use super::task::{panic_message, TaskFailure, WorkerInitHook};

/// Body of a background worker thread.
///
/// Runs the init hook once, then alternates between waiting on the worker
/// condition variable and draining the pending queue, until stop is
/// requested. Spurious wakeups land back in the wait loop.
pub(super) fn worker_loop(shared: &Shared, init_hook: &WorkerInitHook) {
    init_hook();
    loop {
        {
            let mut state = shared.state.lock().unwrap();
            while state.pending.is_empty() && !state.stop {
                state = shared.work_available.wait(state).unwrap();
            }
            if state.stop {
                return;
            }
        }
        drain(shared);
    }
}

/// Pops and executes pending tasks, strictly FIFO, until the queue is empty.
///
/// Executed by background workers and by the thread inside `run`, which helps
/// drain before blocking on the barrier. The lock is never held while a task
/// runs.
pub(super) fn drain(shared: &Shared) {
    loop {
        let (task_index, batch) = {
            let mut state = shared.state.lock().unwrap();
            match state.pending.pop_front() {
                Some(task_index) => {
                    let batch = state
                        .batch
                        .expect("a pending index requires an installed batch");
                    (task_index, batch)
                }
                None => return,
            }
        };

        // Safety: an index stays pending only while the submitting thread is
        // blocked inside `run`, so the batch slice behind the pointer is
        // alive for the duration of this dereference.
        let task = unsafe { &*batch.tasks.add(task_index) };
        let failure = catch_unwind(AssertUnwindSafe(|| (task)()))
            .err()
            .map(|payload| {
                let message = panic_message(payload.as_ref());
                log::error!("task {task_index} panicked: {message}");
                TaskFailure {
                    task_index,
                    message,
                }
            });

        let mut state = shared.state.lock().unwrap();
        state.remaining -= 1;
        if let Some(failure) = failure {
            state.failures.push(failure);
        }
        if state.remaining == 0 {
            // The completion decrement and this signal share the pool mutex;
            // "batch complete" strictly happens-after every task's decrement.
            shared.batch_done.notify_one();
        }
    }
}
