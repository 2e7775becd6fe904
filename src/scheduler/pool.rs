//! Priority Worker Pool
//!
//! A fixed set of worker tasks pulls work from one shared priority queue.
//!
//! ## Design
//!
//! ```text
//!   submit(priority, job)
//!          │
//!          ▼
//!  ┌──────────────────────────────────────────────┐
//!  │ queue (priority-major, FIFO within priority) │
//!  │  [HIGH 7] [HIGH 9] [NORMAL 3] [LOW 2] ...    │
//!  └───────────────────────┬──────────────────────┘
//!                          │ pop_front
//!        ┌─────────────────┼─────────────────┐
//!        ▼                 ▼                 ▼
//!   ┌──────────┐      ┌──────────┐      ┌──────────┐
//!   │ worker 0 │      │ worker 1 │ ...  │ worker N │
//!   └──────────┘      └──────────┘      └──────────┘
//! ```
//!
//! All bookkeeping lives in one `PoolState` behind a mutex. Every state change
//! that someone might be waiting on bumps a `watch` counter; workers and
//! waiters subscribe to it, so a change that happens between checking the
//! state and going to sleep is never missed.
//!
//! Each job runs inside its own Tokio task that the worker awaits. The worker
//! stays occupied for the job's whole lifetime, and a panicking job only fails
//! its own task.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::scheduler::task::{Priority, Task, TaskId, TaskState};

/// Errors returned by [`TaskScheduler::submit`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("task scheduler is shut down")]
    ShutDown,

    #[error("out of memory")]
    OutOfMemory,
}

#[derive(Debug)]
struct PoolState {
    queue: VecDeque<Task>,
    running: HashSet<TaskId>,
    completed: HashSet<TaskId>,
    cancelled: HashSet<TaskId>,
    /// Tasks finished since the pool started. Not reset by cleanup.
    completed_total: u64,
    next_id: TaskId,
    /// Logical worker count. Workers with an index at or above it retire.
    thread_count: usize,
    paused: bool,
    shutdown: bool,
}

impl PoolState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty()
    }

    fn status(&self, id: TaskId) -> Option<TaskState> {
        if self.running.contains(&id) {
            Some(TaskState::Running)
        } else if self.completed.contains(&id) {
            Some(TaskState::Completed)
        } else if self.cancelled.contains(&id) {
            Some(TaskState::Cancelled)
        } else if self.queue.iter().any(|task| task.id == id) {
            Some(TaskState::Queued)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PoolState>,
    /// Bumped on every change a worker or waiter may care about.
    events: watch::Sender<u64>,
}

impl Shared {
    fn notify(&self) {
        self.events.send_modify(|version| *version = version.wrapping_add(1));
    }
}

/// A bounded pool of async workers consuming a priority queue.
///
/// Must be created from within a Tokio runtime.
///
/// # Example
///
/// ```
/// use lrukv::scheduler::{Priority, TaskScheduler};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let pool = TaskScheduler::new(2);
/// let id = pool.submit(Priority::High, async { /* work */ }).unwrap();
///
/// assert!(pool.wait_task(id, Some(Duration::from_secs(1))).await);
/// pool.shutdown().await;
/// # });
/// ```
#[derive(Debug)]
pub struct TaskScheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    /// Starts a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (events, _) = watch::channel(0u64);

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                running: HashSet::new(),
                completed: HashSet::new(),
                cancelled: HashSet::new(),
                completed_total: 0,
                next_id: 1,
                thread_count: threads,
                paused: false,
                shutdown: false,
            }),
            events,
        });

        let workers = (0..threads)
            .map(|index| tokio::spawn(worker_loop(index, Arc::clone(&shared))))
            .collect();

        info!(workers = threads, "Task scheduler started");

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Queues `work` and returns its id.
    ///
    /// The task goes after every queued task of equal or higher priority and
    /// before the first one of strictly lower priority.
    pub fn submit<F>(&self, priority: Priority, work: F) -> Result<TaskId, SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job = Box::pin(work);

        let id = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(SchedulerError::ShutDown);
            }
            state
                .queue
                .try_reserve(1)
                .map_err(|_| SchedulerError::OutOfMemory)?;

            let id = state.next_id;
            state.next_id += 1;

            let position = state
                .queue
                .iter()
                .position(|task| task.priority < priority)
                .unwrap_or(state.queue.len());
            state.queue.insert(position, Task { id, priority, job });
            id
        };

        trace!(task_id = id, %priority, "Task submitted");
        self.shared.notify();
        Ok(id)
    }

    /// Cancels a task that has not started yet.
    ///
    /// Returns false if the task is running, finished, already cancelled or
    /// unknown.
    pub fn cancel(&self, id: TaskId) -> bool {
        let task = {
            let mut state = self.shared.state.lock();
            let Some(position) = state.queue.iter().position(|task| task.id == id) else {
                return false;
            };
            state.cancelled.insert(id);
            state.queue.remove(position)
        };

        // The job is dropped here, outside the lock.
        drop(task);
        debug!(task_id = id, "Task cancelled");
        self.shared.notify();
        true
    }

    pub fn status(&self, id: TaskId) -> Option<TaskState> {
        self.shared.state.lock().status(id)
    }

    /// Waits until no task is queued or running.
    ///
    /// Returns false if `timeout` elapses first. `None` waits forever.
    pub async fn wait_all(&self, timeout: Option<Duration>) -> bool {
        let mut events = self.shared.events.subscribe();
        let shared = &self.shared;

        let idle = async move {
            loop {
                if shared.state.lock().is_idle() {
                    return true;
                }
                if events.changed().await.is_err() {
                    return false;
                }
            }
        };

        with_timeout(timeout, idle).await
    }

    /// Waits until task `id` has completed.
    ///
    /// Returns false if the timeout elapses, or straight away if the task was
    /// cancelled or the id was never issued.
    pub async fn wait_task(&self, id: TaskId, timeout: Option<Duration>) -> bool {
        let mut events = self.shared.events.subscribe();
        let shared = &self.shared;

        let done = async move {
            loop {
                let status = shared.state.lock().status(id);
                match status {
                    Some(TaskState::Completed) => return true,
                    Some(TaskState::Queued) | Some(TaskState::Running) => {}
                    Some(TaskState::Cancelled) | None => return false,
                }
                if events.changed().await.is_err() {
                    return false;
                }
            }
        };

        with_timeout(timeout, done).await
    }

    /// Stops workers from starting new tasks. Running tasks finish normally.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
        debug!("Task scheduler paused");
    }

    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        debug!("Task scheduler resumed");
        self.shared.notify();
    }

    /// Lowers the worker count to `threads`.
    ///
    /// Growing and zero are ignored. Surplus workers retire once they are
    /// idle. Returns the resulting worker count.
    pub fn resize(&self, threads: usize) -> usize {
        let resized = {
            let mut state = self.shared.state.lock();
            if threads == 0 || threads >= state.thread_count {
                return state.thread_count;
            }
            state.thread_count = threads;
            threads
        };

        info!(workers = resized, "Task scheduler resized");
        self.shared.notify();
        resized
    }

    pub fn thread_count(&self) -> usize {
        self.shared.state.lock().thread_count
    }

    /// Number of tasks currently running.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().running.len()
    }

    /// Number of tasks waiting in the queue.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Number of tasks completed since the pool started.
    pub fn completed_count(&self) -> u64 {
        self.shared.state.lock().completed_total
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Forgets finished and cancelled task ids. Returns how many were dropped.
    ///
    /// Afterwards `status` reports `None` for those ids.
    pub fn cleanup_completed(&self) -> usize {
        let mut state = self.shared.state.lock();
        let reclaimed = state.completed.len() + state.cancelled.len();
        state.completed.clear();
        state.cancelled.clear();
        reclaimed
    }

    /// Shuts the pool down and waits for every worker to exit.
    ///
    /// New submissions fail from this point on. Tasks already queued still
    /// run, even if the pool is paused. Calling this more than once is fine.
    pub async fn shutdown(&self) {
        let first = {
            let mut state = self.shared.state.lock();
            !std::mem::replace(&mut state.shutdown, true)
        };
        if first {
            info!("Task scheduler shutting down");
        }
        self.shared.notify();

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker exited abnormally");
            }
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.notify();
    }
}

async fn with_timeout<F>(timeout: Option<Duration>, wait: F) -> bool
where
    F: Future<Output = bool>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or(false),
        None => wait.await,
    }
}

/// One worker: dequeue, run, repeat.
async fn worker_loop(index: usize, shared: Arc<Shared>) {
    let mut events = shared.events.subscribe();
    trace!(worker = index, "Worker started");

    loop {
        let next = {
            let mut state = shared.state.lock();
            if index >= state.thread_count {
                debug!(worker = index, "Worker retired");
                return;
            }

            if state.paused && !state.shutdown {
                None
            } else {
                match state.queue.pop_front() {
                    Some(task) => {
                        state.running.insert(task.id);
                        Some(task)
                    }
                    None if state.shutdown => {
                        trace!(worker = index, "Worker exiting");
                        return;
                    }
                    None => None,
                }
            }
        };

        match next {
            Some(task) => run_task(index, &shared, task).await,
            None => {
                if events.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn run_task(worker: usize, shared: &Shared, task: Task) {
    let Task { id, priority, job } = task;
    trace!(worker, task_id = id, %priority, "Task started");

    if let Err(e) = tokio::spawn(job).await {
        if e.is_panic() {
            warn!(worker, task_id = id, "Task panicked");
        } else {
            warn!(worker, task_id = id, error = %e, "Task did not finish");
        }
    }

    {
        let mut state = shared.state.lock();
        state.running.remove(&id);
        state.completed.insert(id);
        state.completed_total += 1;
    }

    trace!(worker, task_id = id, "Task completed");
    shared.notify();
}
