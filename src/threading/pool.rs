//! The fixed-size fork-join pool and its barrier-synchronized `run` call.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_utils::CachePadded;

use super::task::{panic_message, BatchOutcome, Task, TaskFailure, WorkerInitHook};
use super::worker::{drain, worker_loop};
use crate::error::Error;

/// Pointer to the batch slice currently installed in a pool.
///
/// Only dereferenced between batch installation and the caller's wakeup at
/// the end of `run`; throughout that interval the caller is blocked inside
/// `run` and the slice behind the pointer is alive.
#[derive(Clone, Copy)]
pub(super) struct InstalledBatch {
    pub(super) tasks: *const Task,
}

// Safety: the pointee is a slice of `Send + Sync` tasks that outlives every
// dereference (see the type-level comment); moving the pointer between
// threads grants no additional capability.
unsafe impl Send for InstalledBatch {}

/// Mutable pool state, all guarded by the single pool mutex.
pub(super) struct State {
    /// Indices into the installed batch that no thread has claimed yet,
    /// dequeued in strict FIFO order.
    pub(super) pending: VecDeque<usize>,
    /// Queued tasks not yet completed. Reaching zero releases the caller.
    pub(super) remaining: usize,
    /// Batch currently being executed, if any.
    pub(super) batch: Option<InstalledBatch>,
    /// Failures recorded by the drain loop for the current batch.
    pub(super) failures: Vec<TaskFailure>,
    /// When set, background workers exit their loops.
    pub(super) stop: bool,
}

/// Synchronization block shared between the pool handle and its workers.
pub(super) struct Shared {
    pub(super) state: Mutex<State>,
    /// Wakes background workers when tasks are queued or stop is requested.
    pub(super) work_available: Condvar,
    /// Wakes the thread blocked in `run` when the remaining count hits zero.
    pub(super) batch_done: Condvar,
}

/// A pool of `parallelism - 1` long-lived background worker threads plus the
/// calling thread, executing one batch of independent tasks per `run` call.
///
/// The pool is re-armed every frame: workers go idle between batches and are
/// woken by the next submission. No threads are created or destroyed during
/// the simulation's steady state; reconfiguration means destroying the pool
/// and building a new one.
pub struct Pool {
    shared: Arc<CachePadded<Shared>>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Constructs a pool with `parallelism` total execution contexts: the
    /// calling thread plus `parallelism - 1` background workers.
    ///
    /// Each worker invokes `init_hook` exactly once at thread start, before
    /// it processes any task.
    ///
    /// # Errors
    /// [`Error::ZeroParallelism`] when `parallelism == 0`;
    /// [`Error::WorkerSpawn`] when the OS refuses a thread, in which case
    /// already-spawned workers are joined before returning.
    pub fn new(parallelism: usize, init_hook: WorkerInitHook) -> Result<Self, Error> {
        if parallelism == 0 {
            return Err(Error::ZeroParallelism);
        }

        let shared = Arc::new(CachePadded::new(Shared {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                remaining: 0,
                batch: None,
                failures: Vec::new(),
                stop: false,
            }),
            work_available: Condvar::new(),
            batch_done: Condvar::new(),
        }));

        let mut workers = Vec::with_capacity(parallelism - 1);
        for worker_index in 0..parallelism - 1 {
            let worker_shared = Arc::clone(&shared);
            let worker_hook = Arc::clone(&init_hook);
            let spawned = thread::Builder::new()
                .name(format!("framejoin-worker-{worker_index}"))
                .spawn(move || worker_loop(&worker_shared, &worker_hook));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    // Unwind partial construction: the Drop impl stops and
                    // joins whatever was spawned so far.
                    drop(Pool { shared, workers });
                    return Err(Error::WorkerSpawn(source));
                }
            }
        }

        log::debug!(
            "created pool: {parallelism} execution context(s), {} background worker(s)",
            workers.len()
        );
        Ok(Self { shared, workers })
    }

    /// Gets the pool's total parallelism degree: the calling thread plus the
    /// number of background workers.
    pub fn parallelism(&self) -> usize {
        1 + self.workers.len()
    }

    /// Executes every task in `batch` and blocks until all of them have
    /// completed, then reports which tasks panicked.
    ///
    /// Task 0 always runs synchronously on the calling thread and is never
    /// queued, so every batch makes progress even on a pool with no
    /// background workers. The remaining tasks are dequeued FIFO by whichever
    /// thread gets to them first; the caller helps drain the queue before
    /// blocking on the barrier. Which thread runs which task is unspecified.
    ///
    /// A panicking task is caught at its execution site, logged, counted as
    /// completed, and reported in the returned [`BatchOutcome`]; it never
    /// stalls the batch or corrupts the pool.
    ///
    /// Batches are serialized statically: `run` takes `&mut self`, so a pool
    /// shared between threads cannot accept a second batch while one is in
    /// flight, and a pool cannot be dropped mid-run. The debug assertions on
    /// the queue and remaining count remain as backstops.
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    /// use framejoin::{Pool, Task};
    ///
    /// let pool = Arc::new(Pool::new(2, Arc::new(|| {})).unwrap());
    /// let batch: Vec<Task> = Vec::new();
    /// pool.run(&batch); // requires exclusive access to the pool
    /// ```
    pub fn run(&mut self, batch: &[Task]) -> BatchOutcome {
        if batch.is_empty() {
            return BatchOutcome::default();
        }

        let queued = {
            let mut state = self.shared.state.lock().unwrap();
            debug_assert!(
                state.pending.is_empty() && state.remaining == 0,
                "a batch was submitted while a previous batch is still in flight"
            );
            state.batch = Some(InstalledBatch {
                tasks: batch.as_ptr(),
            });
            state.pending.extend(1..batch.len());
            state.remaining = batch.len() - 1;
            state.remaining > 0
        };
        if queued {
            self.shared.work_available.notify_all();
        }

        // Task 0 runs here, on the caller, without any cross-thread hand-off.
        let mut failures = Vec::new();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (batch[0])())) {
            let message = panic_message(payload.as_ref());
            log::error!("task 0 panicked: {message}");
            failures.push(TaskFailure {
                task_index: 0,
                message,
            });
        }

        // Help drain the queue before waiting; a pool with zero background
        // workers completes the whole batch right here.
        drain(&self.shared);

        let mut state = self.shared.state.lock().unwrap();
        while state.remaining > 0 {
            state = self.shared.batch_done.wait(state).unwrap();
        }
        state.batch = None;
        debug_assert!(
            state.pending.is_empty(),
            "pending tasks left behind after the barrier"
        );
        failures.append(&mut state.failures);
        drop(state);

        BatchOutcome::from_failures(failures)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            debug_assert!(
                state.pending.is_empty() && state.remaining == 0,
                "pool dropped while a batch is still in flight"
            );
            state.stop = true;
        }
        self.shared.work_available.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("a worker thread terminated abnormally");
            }
        }
        log::debug!("pool torn down");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::*;

    fn noop_hook() -> WorkerInitHook {
        Arc::new(|| {})
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        assert!(matches!(
            Pool::new(0, noop_hook()),
            Err(Error::ZeroParallelism)
        ));
    }

    #[test]
    fn parallelism_counts_the_caller() {
        let pool = Pool::new(3, noop_hook()).unwrap();
        assert_eq!(pool.parallelism(), 3);
    }

    #[test]
    fn empty_batch_returns_immediately() {
        let mut pool = Pool::new(4, noop_hook()).unwrap();
        let outcome = pool.run(&[]);
        assert!(outcome.all_succeeded());
    }

    #[test]
    fn single_task_runs_on_the_calling_thread() {
        let mut pool = Pool::new(4, noop_hook()).unwrap();
        let executing_thread = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&executing_thread);
        let batch: Vec<Task> = vec![Box::new(move || {
            *recorded.lock().unwrap() = Some(thread::current().id());
        })];

        let outcome = pool.run(&batch);

        assert!(outcome.all_succeeded());
        assert_eq!(
            *executing_thread.lock().unwrap(),
            Some(thread::current().id())
        );
    }

    #[test]
    fn single_context_pool_completes_batches_on_the_caller() {
        let mut pool = Pool::new(1, noop_hook()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let batch: Vec<Task> = (0..17)
            .map(|_| {
                let counter = Arc::clone(&counter);
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as Task
            })
            .collect();

        let outcome = pool.run(&batch);

        assert!(outcome.all_succeeded());
        assert_eq!(counter.load(Ordering::SeqCst), 17);
    }
}
