//! Schedulers decide where and when deferred deliveries run.
//!
//! - [`ImmediateScheduler`]: runs a task inline
//! - [`TrampolineScheduler`]: runs a task after the task currently running on
//!   this thread returns, iteratively instead of recursively
//! - [`ManualScheduler`]: queues tasks until told to run them
//! - [`TokioScheduler`]: runs tasks in order on a tokio runtime (feature
//!   `async`)
//!
//! # Examples
//!
//! ```rust
//! use cyclens::observable::{ManualScheduler, Scheduler};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let scheduler = ManualScheduler::new();
//! let counter = Arc::new(AtomicUsize::new(0));
//! let counter_clone = counter.clone();
//! scheduler.schedule(Box::new(move || {
//!     counter_clone.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! assert_eq!(counter.load(Ordering::SeqCst), 0);
//! scheduler.run_until_idle();
//! assert_eq!(counter.load(Ordering::SeqCst), 1);
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on behalf of [`Observable::observe_on`](super::Observable::observe_on).
///
/// Implementations must run tasks in the order they were scheduled.
pub trait Scheduler: Send + Sync + 'static {
    /// Schedules `task` for execution.
    fn schedule(&self, task: Task);
}

// =============================================================================
// ImmediateScheduler
// =============================================================================

/// Runs every task inline, on the caller's stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) {
        task();
    }
}

// =============================================================================
// TrampolineScheduler
// =============================================================================

thread_local! {
    /// Tasks waiting for the trampoline active on this thread, if any.
    static TRAMPOLINE: RefCell<Option<VecDeque<Task>>> = const { RefCell::new(None) };
}

/// Clears the thread's trampoline if a task panics.
struct TrampolineGuard;

impl Drop for TrampolineGuard {
    fn drop(&mut self) {
        TRAMPOLINE.with(|queue| queue.borrow_mut().take());
    }
}

/// A current-thread trampoline.
///
/// Outside of a running task, [`schedule`](Scheduler::schedule) runs the task
/// immediately. A task scheduled from inside a running task is queued and
/// runs once the running task has returned: the next tick of the same thread.
/// Nested scheduling therefore never deepens the stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrampolineScheduler;

impl TrampolineScheduler {
    /// Returns `true` when called from a task run by the trampoline.
    pub fn is_running() -> bool {
        TRAMPOLINE.with(|queue| queue.borrow().is_some())
    }
}

impl Scheduler for TrampolineScheduler {
    fn schedule(&self, task: Task) {
        let queued = TRAMPOLINE.with(|queue| {
            let mut queue = queue.borrow_mut();
            match queue.as_mut() {
                Some(pending) => {
                    pending.push_back(task);
                    None
                }
                None => {
                    *queue = Some(VecDeque::new());
                    Some(task)
                }
            }
        });
        let Some(first) = queued else {
            return;
        };

        let _guard = TrampolineGuard;
        first();
        loop {
            let next = TRAMPOLINE.with(|queue| queue.borrow_mut().as_mut().and_then(VecDeque::pop_front));
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

// =============================================================================
// ManualScheduler
// =============================================================================

/// Queues tasks until [`run_next`](Self::run_next) or
/// [`run_until_idle`](Self::run_until_idle) is called.
///
/// Makes "next tick" behaviour observable and deterministic in tests.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<VecDeque<Task>>>,
}

impl ManualScheduler {
    /// Creates a scheduler with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        let task = self.queue.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs queued tasks, including ones they schedule, until none remain.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        while self.run_next() {
            count += 1;
        }
        count
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task) {
        self.queue.lock().push_back(task);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

// =============================================================================
// TokioScheduler
// =============================================================================

#[cfg(feature = "async")]
pub use tokio_scheduler::TokioScheduler;

#[cfg(feature = "async")]
mod tokio_scheduler {
    use std::fmt;

    use tokio::runtime::Handle;
    use tokio::sync::mpsc;

    use super::{Scheduler, Task};

    /// Runs tasks in FIFO order on a single worker task of a tokio runtime.
    ///
    /// The worker stops once every clone of the scheduler has been dropped.
    #[derive(Clone)]
    pub struct TokioScheduler {
        sender: mpsc::UnboundedSender<Task>,
    }

    impl TokioScheduler {
        /// Spawns the worker on the runtime behind `handle`.
        pub fn new(handle: &Handle) -> Self {
            let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
            handle.spawn(async move {
                while let Some(task) = receiver.recv().await {
                    task();
                }
            });
            Self { sender }
        }

        /// Spawns the worker on the runtime the caller is running in.
        ///
        /// Returns `None` outside of a tokio runtime.
        pub fn current() -> Option<Self> {
            Handle::try_current().ok().map(|handle| Self::new(&handle))
        }
    }

    impl Scheduler for TokioScheduler {
        fn schedule(&self, task: Task) {
            if self.sender.send(task).is_err() {
                tracing::warn!("tokio scheduler worker has stopped; task dropped");
            }
        }
    }

    impl fmt::Debug for TokioScheduler {
        fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter
                .debug_struct("TokioScheduler")
                .field("closed", &self.sender.is_closed())
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn push(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) -> impl FnOnce() + Send + 'static {
        let log = log.clone();
        move || log.lock().push(entry)
    }

    #[rstest]
    fn test_immediate_runs_inline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        ImmediateScheduler.schedule(Box::new(push(&log, "ran")));
        assert_eq!(*log.lock(), vec!["ran"]);
    }

    #[rstest]
    fn test_trampoline_runs_nested_task_after_current_one() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer_log = log.clone();
        TrampolineScheduler.schedule(Box::new(move || {
            outer_log.lock().push("outer start");
            TrampolineScheduler.schedule(Box::new(push(&outer_log, "nested")));
            outer_log.lock().push("outer end");
        }));

        assert_eq!(*log.lock(), vec!["outer start", "outer end", "nested"]);
        assert!(!TrampolineScheduler::is_running());
    }

    #[rstest]
    fn test_trampoline_is_stack_safe() {
        fn recurse(counter: Arc<Mutex<u32>>) {
            TrampolineScheduler.schedule(Box::new(move || {
                let next = {
                    let mut value = counter.lock();
                    *value += 1;
                    *value
                };
                if next < 100_000 {
                    recurse(counter);
                }
            }));
        }

        let counter = Arc::new(Mutex::new(0));
        recurse(counter.clone());
        assert_eq!(*counter.lock(), 100_000);
    }

    #[rstest]
    fn test_manual_runs_in_fifo_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scheduler = ManualScheduler::new();
        scheduler.schedule(Box::new(push(&log, "first")));
        scheduler.schedule(Box::new(push(&log, "second")));

        assert_eq!(scheduler.pending(), 2);
        assert!(scheduler.run_next());
        assert_eq!(*log.lock(), vec!["first"]);
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert!(!scheduler.run_next());
    }
}
