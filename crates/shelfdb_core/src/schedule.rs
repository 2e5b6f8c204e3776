//! Cooperative task queue.
//!
//! All engine work runs as tasks on a single FIFO queue. A task runs to
//! completion before the next one starts, so nothing is ever interrupted
//! mid-step; callers observe effects only after driving the queue with
//! [`TaskQueue::run_next`] or [`TaskQueue::run_until_idle`].

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A unit of scheduled work.
pub type Task = Box<dyn FnOnce() + Send>;

/// A shared FIFO of tasks.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    tasks: Mutex<VecDeque<Task>>,
    ticks: AtomicU64,
}

impl TaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` to run after everything already queued.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        self.inner.tasks.lock().push_back(Box::new(task));
    }

    /// Runs the oldest queued task.
    ///
    /// Returns false if the queue was empty. The queue lock is released
    /// before the task runs, so tasks may enqueue more work.
    pub fn run_next(&self) -> bool {
        let task = self.inner.tasks.lock().pop_front();
        match task {
            Some(task) => {
                self.inner.ticks.fetch_add(1, Ordering::Relaxed);
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue drains or `limit` tasks have run.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self, limit: Option<usize>) -> usize {
        let mut ran = 0;
        while limit.map_or(true, |limit| ran < limit) && self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Returns true if no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    /// Returns the number of tasks run since the queue was created.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("queued", &self.len())
            .field("ticks", &self.ticks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_fifo() {
        let queue = TaskQueue::new();
        let trace = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let trace = Arc::clone(&trace);
            queue.enqueue(move || trace.lock().push(i));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_until_idle(None), 3);
        assert_eq!(*trace.lock(), vec![0, 1, 2]);
        assert_eq!(queue.ticks(), 3);
    }

    #[test]
    fn tasks_can_enqueue_tasks() {
        let queue = TaskQueue::new();
        let trace = Arc::new(Mutex::new(Vec::new()));
        {
            let inner_queue = queue.clone();
            let trace = Arc::clone(&trace);
            queue.enqueue(move || {
                trace.lock().push("outer");
                let trace = Arc::clone(&trace);
                inner_queue.enqueue(move || trace.lock().push("inner"));
            });
        }
        {
            let trace = Arc::clone(&trace);
            queue.enqueue(move || trace.lock().push("second"));
        }
        queue.run_until_idle(None);
        assert_eq!(*trace.lock(), vec!["outer", "second", "inner"]);
    }

    #[test]
    fn limit_stops_early() {
        let queue = TaskQueue::new();
        for _ in 0..5 {
            queue.enqueue(|| {});
        }
        assert_eq!(queue.run_until_idle(Some(2)), 2);
        assert_eq!(queue.len(), 3);
        assert!(!queue.is_empty());
    }

    #[test]
    fn run_next_on_empty() {
        let queue = TaskQueue::new();
        assert!(!queue.run_next());
    }
}
