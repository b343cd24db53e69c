//! Posting heartbeat acknowledgements onto the watched thread

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;

/// Unit of work run on the watched thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks on the watched thread's event loop.
///
/// A task only runs once the watched thread gets back to its loop, which is
/// exactly what makes it a liveness proof.
pub trait HeartbeatScheduler: Send + Sync {
    fn post(&self, task: Task);
}

impl<T: HeartbeatScheduler + ?Sized> HeartbeatScheduler for Arc<T> {
    fn post(&self, task: Task) {
        (**self).post(task)
    }
}

/// Posts tasks onto a tokio runtime. Watch a `current_thread` runtime so that
/// the acknowledgement competes with the work that might be hanging.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime the caller is running on.
    ///
    /// Panics outside of a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl HeartbeatScheduler for TokioScheduler {
    fn post(&self, task: Task) {
        self.handle.spawn(async move { task() });
    }
}

/// Queues tasks until the owner drains them. Lets tests decide exactly when
/// the watched thread "responds".
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<VecDeque<Task>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued task in posting order, returning how many ran
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<Task> = {
            let mut queue = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            queue.drain(..).collect()
        };
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop queued tasks without running them
    pub fn discard(&self) -> usize {
        let mut queue = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let count = queue.len();
        queue.clear();
        count
    }
}

impl HeartbeatScheduler for ManualScheduler {
    fn post(&self, task: Task) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
