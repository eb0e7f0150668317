//! Engine entry point and running executions
//!
//! An [`Engine`] starts a root closure as an execution: a fresh root counter
//! and terminator, a scheduler with its worker threads, and a timer thread.
//! Publications, site faults and the final halt are reported to the host
//! through an [`EventSink`]. The returned [`ExecutionHandle`] waits for the
//! execution to complete, kills it, and reads its statistics.

use crate::config::{ConfigError, EngineConfig};
use crate::runtime::closure::{Closure, Code, Sink};
use crate::runtime::context::Context;
use crate::runtime::dispatch::Dispatcher;
use crate::runtime::scheduler::{
    Counters, Scheduler, SchedulerStats, SpawnError, Task, TimerThread, WorkerPool,
};
use crate::runtime::sync::{Counter, Terminator};
use crate::runtime::{RuntimeError, RuntimeResult};
use orc_sdk::{CallSiteId, SiteError, TimerService, Value};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Host events
// ============================================================================

/// A site fault reported to the host
#[derive(Debug, Clone, PartialEq)]
pub struct SiteFault {
    /// Call site the failing call was issued from
    pub call_site: CallSiteId,
    /// Name of the failing site
    pub site: String,
    /// The fault
    pub error: SiteError,
}

/// Receiver of an execution's observable events.
///
/// Methods are called from worker and timer threads.
pub trait EventSink: Send + Sync {
    /// A value was published at the top level
    fn publish(&self, value: Value);

    /// A site call failed; the calling branch halted
    fn fault(&self, fault: SiteFault) {
        let _ = fault;
    }

    /// A body failed outside a site call; the branch halted
    fn error(&self, error: RuntimeError) {
        let _ = error;
    }

    /// Every branch of the execution has halted
    fn halted(&self) {}
}

/// Event sink that records everything it receives
#[derive(Debug, Default)]
pub struct EventLog {
    publications: Mutex<Vec<Value>>,
    faults: Mutex<Vec<SiteFault>>,
    errors: Mutex<Vec<RuntimeError>>,
    halted: AtomicBool,
}

impl EventLog {
    /// Create an empty shared log
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publications in arrival order
    pub fn publications(&self) -> Vec<Value> {
        self.publications.lock().clone()
    }

    /// Site faults in arrival order
    pub fn faults(&self) -> Vec<SiteFault> {
        self.faults.lock().clone()
    }

    /// Body errors in arrival order
    pub fn errors(&self) -> Vec<RuntimeError> {
        self.errors.lock().clone()
    }

    /// Whether the halt event arrived
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

impl EventSink for EventLog {
    fn publish(&self, value: Value) {
        self.publications.lock().push(value);
    }

    fn fault(&self, fault: SiteFault) {
        self.faults.lock().push(fault);
    }

    fn error(&self, error: RuntimeError) {
        self.errors.lock().push(error);
    }

    fn halted(&self) {
        self.halted.store(true, Ordering::Release);
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// State shared by every task of one execution
pub(crate) struct Runtime {
    config: EngineConfig,
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    timer: Arc<TimerThread>,
    events: Arc<dyn EventSink>,
}

impl Runtime {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn timer(&self) -> Arc<dyn TimerService> {
        self.timer.clone()
    }

    /// Spawn a fresh branch, inlining it when it is known to be cheap.
    ///
    /// A spawn refused by the task bound runs inline while the stack allows
    /// it. Past the inline limit the child halts without running and the
    /// refusal is reported to the host.
    pub fn spawn(self: &Arc<Self>, task: Task, depth: usize) {
        if self.should_inline(task.closure().code(), depth) {
            Counters::bump(&self.scheduler.counters.inlined);
            task.counter().new_token();
            self.run_task(task, depth + 1);
            return;
        }

        if let Err(SpawnError::Exhausted { task, limit }) = self.scheduler.spawn(task) {
            if depth < self.config.max_inline_depth {
                tracing::debug!(limit, depth, "task bound reached; running spawn inline");
                task.counter().new_token();
                self.run_task(*task, depth + 1);
            } else {
                self.error(RuntimeError::ResourceExhausted(format!(
                    "task limit of {} outstanding tasks reached at inline depth {}; branch halted",
                    limit, depth
                )));
                // No token was issued for the refused task.
                drop(task);
            }
        }
    }

    /// Queue a resumption; never refused
    pub fn resume(&self, task: Task) {
        self.scheduler.resume(task);
    }

    /// Take one queued task and run it. Returns false if nothing was queued.
    pub fn run_one(self: &Arc<Self>) -> bool {
        match self.scheduler.find_work() {
            Some(task) => {
                self.run_task(task, 0);
                true
            }
            None => false,
        }
    }

    /// Run a task that owns one token of its counter.
    ///
    /// Checkpoint: a task whose scope is already dead halts without running.
    pub fn run_task(self: &Arc<Self>, task: Task, depth: usize) {
        let (closure, args, sink, counter, terminator) = task.into_parts();

        if !terminator.is_live() {
            Counters::bump(&self.scheduler.counters.killed);
            counter.halt_token();
            return;
        }

        let cx = Context::new(self.clone(), counter, terminator, sink, depth);
        let start = Instant::now();
        let result = closure.execute(&cx, &args);
        closure.code().stats().record(start.elapsed());
        Counters::bump(&self.scheduler.counters.completed);

        cx.settle(result);
    }

    /// Whether a spawn of `code` at `depth` runs on the spawning thread
    fn should_inline(&self, code: &Code, depth: usize) -> bool {
        let config = &self.config;
        if !config.allow_spawn_inlining || depth >= config.max_inline_depth {
            return false;
        }
        if code.must_spawn() && !config.allow_all_spawn_inlining {
            return false;
        }
        // Code with no recorded runs counts as expensive.
        code.stats()
            .time_per_call()
            .map_or(false, |per_call| per_call < config.inline_time_limit())
    }

    pub fn publish(&self, value: Value) {
        Counters::bump(&self.scheduler.counters.publications);
        tracing::trace!(?value, "publication");
        self.events.publish(value);
    }

    pub fn fault(&self, fault: SiteFault) {
        Counters::bump(&self.scheduler.counters.faults);
        tracing::warn!(
            call_site = %fault.call_site,
            site = %fault.site,
            error = %fault.error,
            "site call failed"
        );
        self.events.fault(fault);
    }

    pub fn error(&self, error: RuntimeError) {
        tracing::error!(%error, "branch failed");
        self.events.error(error);
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            resolutions: self.dispatcher.resolutions(),
            ..self.scheduler.stats()
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Starts executions with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create an engine
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Create an engine configured from `ORC_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(EngineConfig::from_env()?))
    }

    /// The engine's configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start executing `root` with no arguments
    pub fn start(&self, root: Closure, events: Arc<dyn EventSink>) -> RuntimeResult<ExecutionHandle> {
        let workers = self.config.effective_workers();
        let (scheduler, deques) = Scheduler::new(workers, self.config.max_outstanding_tasks);

        let timer = TimerThread::new();
        timer
            .start(&format!("{}-timer", self.config.thread_name_prefix))
            .map_err(|e| RuntimeError::ResourceExhausted(format!("timer thread: {}", e)))?;

        let runtime = Arc::new(Runtime {
            config: self.config.clone(),
            scheduler,
            dispatcher: Dispatcher::new(self.config.call_cache_bound),
            timer,
            events: events.clone(),
        });

        let completion = Arc::new(Completion::default());
        let terminator = Terminator::root();
        let counter = {
            let completion = completion.clone();
            Counter::root(move || {
                events.halted();
                completion.signal();
            })
        };

        tracing::debug!(workers, root = root.code().name(), "starting execution");
        runtime.resume(Task::new(
            root,
            Vec::new(),
            Sink::Host,
            counter.clone(),
            terminator.clone(),
        ));
        counter.halt_token();

        let mut handle = ExecutionHandle {
            runtime: runtime.clone(),
            terminator,
            completion,
            workers: None,
            stopped: false,
        };
        let pool = WorkerPool::start(&runtime, deques)
            .map_err(|e| RuntimeError::ResourceExhausted(format!("worker thread: {}", e)))?;
        handle.workers = Some(pool);
        Ok(handle)
    }

    /// Run `root` to completion and return everything it reported
    pub fn run(&self, root: Closure) -> RuntimeResult<Arc<EventLog>> {
        let log = EventLog::new();
        let mut handle = self.start(root, log.clone())?;
        handle.wait();
        handle.shutdown();
        Ok(log)
    }
}

#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    fn signal(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }

    fn is_done(&self) -> bool {
        *self.done.lock()
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cond.wait(&mut done);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            if self.cond.wait_until(&mut done, deadline).timed_out() {
                break;
            }
        }
        *done
    }
}

/// Handle to a running execution.
///
/// Dropping the handle kills the execution and stops its threads.
pub struct ExecutionHandle {
    runtime: Arc<Runtime>,
    terminator: Arc<Terminator>,
    completion: Arc<Completion>,
    workers: Option<WorkerPool>,
    stopped: bool,
}

impl ExecutionHandle {
    /// Block until every branch has halted
    pub fn wait(&self) {
        self.completion.wait();
    }

    /// Block until every branch has halted or `timeout` elapses.
    ///
    /// Returns whether the execution completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.completion.wait_timeout(timeout)
    }

    /// Kill the root scope. Pending site calls are cancelled and queued
    /// tasks halt at their next checkpoint.
    pub fn halt(&self) {
        tracing::debug!("halting execution");
        self.terminator.kill();
    }

    /// Whether every branch has halted
    pub fn is_done(&self) -> bool {
        self.completion.is_done()
    }

    /// Snapshot of scheduler and dispatcher statistics
    pub fn stats(&self) -> SchedulerStats {
        self.runtime.stats()
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.as_ref().map_or(0, WorkerPool::len)
    }

    /// Kill the execution and stop its threads.
    ///
    /// Tasks still queued are halted without running.
    pub fn shutdown(&mut self) {
        if std::mem::replace(&mut self.stopped, true) {
            return;
        }

        self.terminator.kill();
        if let Some(mut workers) = self.workers.take() {
            workers.stop();
        }
        self.runtime.timer.stop();

        let mut drained = 0usize;
        loop {
            let tasks = self.runtime.scheduler.drain();
            if tasks.is_empty() {
                break;
            }
            drained += tasks.len();
            for task in tasks {
                Counters::bump(&self.runtime.scheduler.counters.killed);
                task.counter().halt_token();
            }
        }

        tracing::debug!(drained, done = self.is_done(), "execution shut down");
    }
}

impl Drop for ExecutionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
