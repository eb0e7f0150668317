//! Task structure

use crate::runtime::closure::{Closure, Sink};
use crate::runtime::sync::{Counter, Terminator};
use orc_sdk::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of schedulable work.
///
/// A task is consumed exactly once: the scheduler runs its closure to a
/// terminal [`Outcome`](crate::runtime::Outcome) or suspension. Once spawned,
/// it owns one token of `counter`.
pub struct Task {
    id: TaskId,
    closure: Closure,
    args: Vec<Value>,
    sink: Sink,
    counter: Arc<Counter>,
    terminator: Arc<Terminator>,
}

impl Task {
    /// Create a task that runs `closure` with `args` in the given scope
    pub fn new(
        closure: Closure,
        args: Vec<Value>,
        sink: Sink,
        counter: Arc<Counter>,
        terminator: Arc<Terminator>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            closure,
            args,
            sink,
            counter,
            terminator,
        }
    }

    /// Get the task ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The closure to run
    pub fn closure(&self) -> &Closure {
        &self.closure
    }

    /// The counter this task holds a token of
    pub fn counter(&self) -> &Arc<Counter> {
        &self.counter
    }

    /// The terminator checked before running
    pub fn terminator(&self) -> &Arc<Terminator> {
        &self.terminator
    }

    /// Take the task apart
    pub fn into_parts(self) -> (Closure, Vec<Value>, Sink, Arc<Counter>, Arc<Terminator>) {
        (self.closure, self.args, self.sink, self.counter, self.terminator)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id.0)
            .field("closure", &self.closure)
            .field("args", &self.args.len())
            .field("counter", &self.counter.id())
            .finish()
    }
}
