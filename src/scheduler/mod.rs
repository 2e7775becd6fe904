//! Task Scheduler Module
//!
//! A bounded pool of async workers fed by a priority queue. The server submits
//! one task per accepted connection, so the worker count is also the ceiling
//! on concurrently served clients; extra clients wait in the queue.
//!
//! ## Features
//!
//! - **Priorities**: `High` before `Normal` before `Low`, FIFO within a level
//! - **Cancellation**: queued tasks can be withdrawn before they start
//! - **Waiting**: for one task or for the whole pool, with optional timeout
//! - **Pause/Resume**: stop handing out work without stopping running tasks
//! - **Shrinking**: lower the worker count at runtime

pub mod pool;
pub mod task;

pub use pool::{SchedulerError, TaskScheduler};
pub use task::{Job, Priority, TaskId, TaskState};
