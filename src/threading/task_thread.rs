//! A single background thread that serially runs tasks queued by its owner.
//!
//! Companion to the fork-join pool for work that must leave the simulation
//! thread but needs no parallelism (asset loading, sound triggering and the
//! like). The owning thread may queue-and-forget, or queue-and-wait through
//! a completion indicator; it is also responsible for this object's lifetime.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use super::task::panic_message;
use crate::error::Error;

type SerialTask = Box<dyn FnOnce() + Send>;

struct IndicatorState {
    completed: bool,
    panic_message: Option<String>,
}

/// Handle returned when a task is queued; lets the owner wait for that task
/// and observe its failure, if any.
#[derive(Clone)]
pub struct TaskCompletionIndicator {
    state: Arc<(Mutex<IndicatorState>, Condvar)>,
}

impl TaskCompletionIndicator {
    fn new() -> Self {
        Self {
            state: Arc::new((
                Mutex::new(IndicatorState {
                    completed: false,
                    panic_message: None,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Blocks until the task has completed.
    ///
    /// # Errors
    /// The task's panic message, when it panicked.
    pub fn wait(&self) -> Result<(), String> {
        let (lock, signal) = &*self.state;
        let mut state = lock.lock().unwrap();
        while !state.completed {
            state = signal.wait(state).unwrap();
        }
        match &state.panic_message {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    fn mark_completed(&self, panic_message: Option<String>) {
        let (lock, signal) = &*self.state;
        let mut state = lock.lock().unwrap();
        state.panic_message = panic_message;
        state.completed = true;
        signal.notify_one();
    }
}

struct QueuedTask {
    task: SerialTask,
    indicator: TaskCompletionIndicator,
}

struct ThreadState {
    tasks: VecDeque<QueuedTask>,
    stop: bool,
}

struct ThreadShared {
    queue: Mutex<ThreadState>,
    // Just one condition variable: neither side ever waits and signals at
    // the same time.
    signal: Condvar,
}

/// A serial task runner backed by one long-lived background thread.
///
/// With `is_multithreaded` false, no thread is spawned at all and every
/// queued task runs inline on the calling thread (the single-core fallback).
pub struct TaskThread {
    shared: Arc<ThreadShared>,
    thread: Option<JoinHandle<()>>,
}

impl TaskThread {
    /// Creates a task thread whose OS thread carries `name`.
    ///
    /// # Errors
    /// [`Error::WorkerSpawn`] when the OS refuses the thread.
    pub fn new(name: &str, is_multithreaded: bool) -> Result<Self, Error> {
        let shared = Arc::new(ThreadShared {
            queue: Mutex::new(ThreadState {
                tasks: VecDeque::new(),
                stop: false,
            }),
            signal: Condvar::new(),
        });

        let thread = if is_multithreaded {
            let thread_shared = Arc::clone(&shared);
            Some(
                thread::Builder::new()
                    .name(name.to_owned())
                    .spawn(move || thread_loop(&thread_shared))?,
            )
        } else {
            log::debug!("task thread '{name}' running in inline mode");
            None
        };

        Ok(Self { shared, thread })
    }

    /// Queues a task to run on the task thread, returning an indicator the
    /// caller may wait on, or simply drop for queue-and-forget use.
    pub fn queue_task(&self, task: impl FnOnce() + Send + 'static) -> TaskCompletionIndicator {
        let indicator = TaskCompletionIndicator::new();
        if self.thread.is_some() {
            {
                let mut state = self.shared.queue.lock().unwrap();
                state.tasks.push_back(QueuedTask {
                    task: Box::new(task),
                    indicator: indicator.clone(),
                });
            }
            self.shared.signal.notify_one();
        } else {
            execute(Box::new(task), &indicator);
        }
        indicator
    }

    /// Runs a task on the task thread and waits until it returns.
    ///
    /// # Errors
    /// The task's panic message, when it panicked.
    pub fn run_synchronously(&self, task: impl FnOnce() + Send + 'static) -> Result<(), String> {
        self.queue_task(task).wait()
    }

    /// Places a synchronization point in the queue; waiting on the returned
    /// indicator tells the owner the queue has drained everything ahead of
    /// it.
    pub fn queue_synchronization_point(&self) -> TaskCompletionIndicator {
        self.queue_task(|| {})
    }
}

impl Drop for TaskThread {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            {
                let mut state = self.shared.queue.lock().unwrap();
                state.stop = true;
            }
            self.shared.signal.notify_one();
            if handle.join().is_err() {
                log::error!("task thread terminated abnormally");
            }
        }
    }
}

fn execute(task: SerialTask, indicator: &TaskCompletionIndicator) {
    let failure = catch_unwind(AssertUnwindSafe(task)).err().map(|payload| {
        let message = panic_message(payload.as_ref());
        log::error!("queued task panicked: {message}");
        message
    });
    indicator.mark_completed(failure);
}

fn thread_loop(shared: &ThreadShared) {
    loop {
        let queued = {
            let mut state = shared.queue.lock().unwrap();
            loop {
                // Queued tasks run to completion even during shutdown; stop
                // only takes effect on an empty queue.
                if let Some(queued) = state.tasks.pop_front() {
                    break Some(queued);
                }
                if state.stop {
                    break None;
                }
                state = shared.signal.wait(state).unwrap();
            }
        };
        match queued {
            Some(queued) => execute(queued.task, &queued.indicator),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn tasks_run_on_the_named_background_thread() {
        let task_thread = TaskThread::new("loader", true).unwrap();
        let observed_name = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&observed_name);

        task_thread
            .run_synchronously(move || {
                *recorded.lock().unwrap() = thread::current().name().map(str::to_owned);
            })
            .unwrap();

        assert_eq!(observed_name.lock().unwrap().as_deref(), Some("loader"));
    }

    #[test]
    fn inline_mode_runs_on_the_calling_thread() {
        let task_thread = TaskThread::new("loader", false).unwrap();
        let executing_thread = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&executing_thread);

        task_thread
            .run_synchronously(move || {
                *recorded.lock().unwrap() = Some(thread::current().id());
            })
            .unwrap();

        assert_eq!(
            *executing_thread.lock().unwrap(),
            Some(thread::current().id())
        );
    }

    #[test]
    fn queued_tasks_run_in_submission_order() {
        let task_thread = TaskThread::new("loader", true).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for step in 0..5 {
            let order = Arc::clone(&order);
            task_thread.queue_task(move || {
                order.lock().unwrap().push(step);
            });
        }
        task_thread.queue_synchronization_point().wait().unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn a_panicking_task_surfaces_its_message() {
        let task_thread = TaskThread::new("loader", true).unwrap();

        let result = task_thread.run_synchronously(|| panic!("texture missing"));

        assert_eq!(result, Err(String::from("texture missing")));

        // The thread survives a panicking task.
        task_thread.run_synchronously(|| {}).unwrap();
    }

    #[test]
    fn queued_tasks_complete_before_shutdown() {
        let completed = Arc::new(AtomicUsize::new(0));
        {
            let task_thread = TaskThread::new("loader", true).unwrap();
            for _ in 0..50 {
                let completed = Arc::clone(&completed);
                task_thread.queue_task(move || {
                    completed.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(completed.load(Ordering::SeqCst), 50);
    }
}
