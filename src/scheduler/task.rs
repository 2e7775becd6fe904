//! Task types shared by the scheduler and its callers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Identifier handed out by [`TaskScheduler::submit`](super::TaskScheduler::submit).
///
/// Ids are assigned in submission order starting at 1 and never reused.
pub type TaskId = u64;

/// A unit of work: any `Send` future that produces nothing.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Scheduling priority. Higher priorities are dequeued first; tasks of equal
/// priority run in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        };
        f.write_str(name)
    }
}

/// Where a task is in its lifecycle.
///
/// ```text
/// Queued ──> Running ──> Completed
///   │
///   └──────> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Cancelled,
}

/// A queued task.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) priority: Priority,
    pub(crate) job: Job,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
