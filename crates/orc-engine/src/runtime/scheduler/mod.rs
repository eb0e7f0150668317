//! Task scheduler: work-stealing run queues, worker threads and timers
//!
//! Each execution owns one [`Scheduler`]. Workers drain their own LIFO deque,
//! steal from each other, and fall back to the global injector. The
//! [`TimerThread`] runs deferred callbacks for sites that wait on time.

#[allow(clippy::module_inception)]
mod scheduler;
mod task;
mod timer;
mod worker;

pub use scheduler::{Scheduler, SchedulerStats, SpawnError};
pub(crate) use scheduler::Counters;
pub use task::{Task, TaskId};
pub use timer::TimerThread;
pub(crate) use worker::WorkerPool;
