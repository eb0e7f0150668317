//! Run queue shared by the workers of one execution
//!
//! Tasks spawned from a worker thread go to that worker's LIFO deque; tasks
//! spawned from anywhere else go to the global injector. Idle workers steal
//! from a random victim, then from the injector.

use crate::runtime::scheduler::Task;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as CWorker};
use serde::Serialize;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Error returned when a spawn is refused
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The outstanding-task bound is reached; the task is handed back so the
    /// caller can run it itself
    #[error("task limit of {limit} outstanding tasks reached")]
    Exhausted {
        /// The refused task
        task: Box<Task>,
        /// The configured bound
        limit: usize,
    },
}

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Tasks queued by fresh spawns
    pub tasks_spawned: u64,

    /// Tasks queued to resume a suspended computation
    pub tasks_resumed: u64,

    /// Spawns run synchronously on the spawning thread
    pub tasks_inlined: u64,

    /// Spawns refused by the outstanding-task bound
    pub tasks_refused: u64,

    /// Tasks that ran to completion or suspension
    pub tasks_completed: u64,

    /// Tasks halted at the pre-run checkpoint because their scope was killed
    pub tasks_killed: u64,

    /// Values delivered to the host
    pub publications: u64,

    /// Site faults reported to the host
    pub faults: u64,

    /// Call-target resolutions performed by the dispatcher
    pub resolutions: u64,

    /// Tasks currently queued
    pub outstanding: usize,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub spawned: AtomicU64,
    pub resumed: AtomicU64,
    pub inlined: AtomicU64,
    pub refused: AtomicU64,
    pub completed: AtomicU64,
    pub killed: AtomicU64,
    pub publications: AtomicU64,
    pub faults: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

struct LocalQueue {
    scheduler: u64,
    deque: CWorker<Task>,
}

thread_local! {
    static LOCAL: RefCell<Option<LocalQueue>> = const { RefCell::new(None) };
}

/// Run queue and bookkeeping for one execution
pub struct Scheduler {
    /// Identity, to match a worker thread's local deque
    id: u64,

    /// Global queue for tasks spawned off the worker threads
    injector: Injector<Task>,

    /// Stealers for every worker deque
    stealers: Vec<Stealer<Task>>,

    /// Bound on queued fresh spawns (None = unbounded)
    limit: Option<usize>,

    /// Tasks queued and not yet picked up
    outstanding: AtomicUsize,

    /// Statistic counters
    pub(crate) counters: Counters,
}

impl Scheduler {
    /// Create a scheduler for `worker_count` workers.
    ///
    /// Returns the worker deques; each must be installed on its worker thread
    /// with [`Scheduler::install_local`].
    pub fn new(worker_count: usize, limit: Option<usize>) -> (Self, Vec<CWorker<Task>>) {
        let deques: Vec<CWorker<Task>> = (0..worker_count).map(|_| CWorker::new_lifo()).collect();
        let stealers = deques.iter().map(CWorker::stealer).collect();

        let scheduler = Self {
            id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
            injector: Injector::new(),
            stealers,
            limit,
            outstanding: AtomicUsize::new(0),
            counters: Counters::default(),
        };
        (scheduler, deques)
    }

    /// Install `deque` as the calling thread's local queue
    pub fn install_local(&self, deque: CWorker<Task>) {
        LOCAL.with(|local| {
            *local.borrow_mut() = Some(LocalQueue {
                scheduler: self.id,
                deque,
            });
        });
    }

    /// Remove the calling thread's local queue
    pub fn uninstall_local(&self) {
        LOCAL.with(|local| local.borrow_mut().take());
    }

    /// Spawn a fresh branch.
    ///
    /// Issues the task's counter token before queuing. Past the bound the task
    /// is handed back untouched and no token is issued.
    pub fn spawn(&self, task: Task) -> Result<(), SpawnError> {
        if let Some(limit) = self.limit {
            let reserved = self
                .outstanding
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < limit).then_some(n + 1)
                });
            if reserved.is_err() {
                Counters::bump(&self.counters.refused);
                return Err(SpawnError::Exhausted {
                    task: Box::new(task),
                    limit,
                });
            }
        } else {
            self.outstanding.fetch_add(1, Ordering::AcqRel);
        }

        task.counter().new_token();
        Counters::bump(&self.counters.spawned);
        tracing::trace!(task = task.id().as_u64(), "spawn");
        self.push(task);
        Ok(())
    }

    /// Queue a task that resumes a suspended computation.
    ///
    /// Resumptions are never refused. The task's token is issued here.
    pub fn resume(&self, task: Task) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        task.counter().new_token();
        Counters::bump(&self.counters.resumed);
        tracing::trace!(task = task.id().as_u64(), "resume");
        self.push(task);
    }

    fn push(&self, task: Task) {
        let task = LOCAL.with(|local| match local.borrow().as_ref() {
            Some(queue) if queue.scheduler == self.id => {
                queue.deque.push(task);
                None
            }
            _ => Some(task),
        });
        if let Some(task) = task {
            self.injector.push(task);
        }
    }

    /// Find work: local pop, then steal, then inject
    pub fn find_work(&self) -> Option<Task> {
        let local = LOCAL.with(|local| {
            local
                .borrow()
                .as_ref()
                .filter(|queue| queue.scheduler == self.id)
                .and_then(|queue| queue.deque.pop())
        });

        let task = local.or_else(|| loop {
            if let Some(task) = self.steal_from_others() {
                break Some(task);
            }
            match self.injector.steal() {
                Steal::Success(task) => break Some(task),
                Steal::Empty => break None,
                Steal::Retry => continue,
            }
        })?;

        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        Some(task)
    }

    /// Steal from other workers, starting at a random victim
    fn steal_from_others(&self) -> Option<Task> {
        use rand::Rng;

        if self.stealers.is_empty() {
            return None;
        }

        let start = rand::thread_rng().gen_range(0..self.stealers.len());
        for i in 0..self.stealers.len() {
            let stealer = &self.stealers[(start + i) % self.stealers.len()];
            loop {
                match stealer.steal() {
                    Steal::Success(task) => return Some(task),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    /// Drop every queued task without running it
    pub fn drain(&self) -> Vec<Task> {
        let mut drained = Vec::new();
        while let Some(task) = self.find_work() {
            drained.push(task);
        }
        drained
    }

    /// Number of queued tasks
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Configured bound on queued spawns
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Snapshot of the statistics
    pub fn stats(&self) -> SchedulerStats {
        let c = &self.counters;
        SchedulerStats {
            tasks_spawned: c.spawned.load(Ordering::Relaxed),
            tasks_resumed: c.resumed.load(Ordering::Relaxed),
            tasks_inlined: c.inlined.load(Ordering::Relaxed),
            tasks_refused: c.refused.load(Ordering::Relaxed),
            tasks_completed: c.completed.load(Ordering::Relaxed),
            tasks_killed: c.killed.load(Ordering::Relaxed),
            publications: c.publications.load(Ordering::Relaxed),
            faults: c.faults.load(Ordering::Relaxed),
            resolutions: 0,
            outstanding: self.outstanding(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::closure::{Closure, Code, Env, Outcome, Sink};
    use crate::runtime::context::Context;
    use crate::runtime::sync::{Counter, Terminator};
    use crate::runtime::RuntimeResult;
    use orc_sdk::Value;
    use std::sync::Arc;

    fn test_task(counter: &Arc<Counter>) -> Task {
        let code = Code::new("noop", 0, |_: &Context, _: &Env, _: &[Value]| -> RuntimeResult<Outcome> {
            Ok(Outcome::Halted)
        });
        Task::new(
            Closure::new(code, Env::empty()),
            vec![],
            Sink::Host,
            counter.clone(),
            Terminator::root(),
        )
    }

    #[test]
    fn test_spawn_issues_token() {
        let (scheduler, _deques) = Scheduler::new(2, None);
        let counter = Counter::root(|| {});

        scheduler.spawn(test_task(&counter)).unwrap();
        scheduler.spawn(test_task(&counter)).unwrap();

        assert_eq!(counter.count(), 3);
        assert_eq!(scheduler.outstanding(), 2);
        assert_eq!(scheduler.stats().tasks_spawned, 2);
    }

    #[test]
    fn test_spawn_past_limit_hands_task_back() {
        let (scheduler, _deques) = Scheduler::new(1, Some(1));
        let counter = Counter::root(|| {});

        scheduler.spawn(test_task(&counter)).unwrap();
        let refused = scheduler.spawn(test_task(&counter));

        match refused {
            Err(SpawnError::Exhausted { limit, .. }) => assert_eq!(limit, 1),
            Ok(()) => panic!("spawn past the limit was accepted"),
        }
        // No token was issued for the refused task.
        assert_eq!(counter.count(), 2);
        assert_eq!(scheduler.stats().tasks_refused, 1);
    }

    #[test]
    fn test_resume_ignores_limit() {
        let (scheduler, _deques) = Scheduler::new(1, Some(1));
        let counter = Counter::root(|| {});

        scheduler.spawn(test_task(&counter)).unwrap();
        scheduler.resume(test_task(&counter));

        assert_eq!(scheduler.outstanding(), 2);
        assert_eq!(counter.count(), 3);
    }

    #[test]
    fn test_find_work_from_injector_and_local() {
        let (scheduler, mut deques) = Scheduler::new(1, None);
        let counter = Counter::root(|| {});

        // Off-worker spawn lands in the injector.
        scheduler.spawn(test_task(&counter)).unwrap();

        // After installing the local deque, spawns stay local.
        scheduler.install_local(deques.remove(0));
        scheduler.spawn(test_task(&counter)).unwrap();

        assert!(scheduler.find_work().is_some());
        assert!(scheduler.find_work().is_some());
        assert!(scheduler.find_work().is_none());
        assert_eq!(scheduler.outstanding(), 0);

        scheduler.uninstall_local();
    }
}
