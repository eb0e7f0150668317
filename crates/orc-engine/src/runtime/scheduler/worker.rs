//! Worker threads that execute tasks
//!
//! Workers pick up tasks from their local deque, steal from other workers or
//! take from the global injector, then run them through the runtime.
//!
//! Site panics are absorbed by the dispatcher. Any panic that still reaches a
//! worker means the token accounting can no longer be trusted, so the process
//! aborts instead of leaving the execution to hang.

use crate::runtime::execution::Runtime;
use crate::runtime::panic_message;
use crate::runtime::scheduler::Task;
use crossbeam::utils::Backoff;
use crossbeam_deque::Worker as CWorker;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Worker thread that executes tasks
pub(crate) struct Worker {
    /// Worker ID
    id: usize,

    /// Worker thread handle
    handle: Option<thread::JoinHandle<()>>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    /// Start a worker thread that owns `deque`
    pub fn start(
        id: usize,
        prefix: &str,
        runtime: Arc<Runtime>,
        deque: CWorker<Task>,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-{}", prefix, id))
            .spawn(move || {
                runtime.scheduler().install_local(deque);
                Worker::run_loop(id, &runtime, &flag);
                runtime.scheduler().uninstall_local();
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            shutdown,
        })
    }

    /// Worker thread main loop
    fn run_loop(id: usize, runtime: &Arc<Runtime>, shutdown: &AtomicBool) {
        tracing::debug!(worker = id, "worker started");
        let backoff = Backoff::new();

        while !shutdown.load(Ordering::Acquire) {
            let ran = match panic::catch_unwind(AssertUnwindSafe(|| runtime.run_one())) {
                Ok(ran) => ran,
                Err(payload) => {
                    tracing::error!(
                        worker = id,
                        panic = panic_message(&*payload),
                        "worker panicked; aborting"
                    );
                    std::process::abort();
                }
            };
            if ran {
                backoff.reset();
            } else if !backoff.is_completed() {
                backoff.snooze();
            } else {
                // Idle: sleep briefly to avoid busy-waiting.
                thread::sleep(Duration::from_micros(100));
            }
        }

        tracing::debug!(worker = id, "worker stopped");
    }

    /// Signal the worker to stop
    pub fn signal_stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Stop the worker thread and wait for it
    pub fn stop(&mut self) {
        self.signal_stop();

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!(worker = self.id, "worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The worker threads of one execution
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Start one worker per deque
    pub fn start(runtime: &Arc<Runtime>, deques: Vec<CWorker<Task>>) -> std::io::Result<Self> {
        let prefix = runtime.config().thread_name_prefix.clone();
        let mut workers = Vec::with_capacity(deques.len());
        for (id, deque) in deques.into_iter().enumerate() {
            workers.push(Worker::start(id, &prefix, runtime.clone(), deque)?);
        }
        tracing::debug!(workers = workers.len(), "worker pool started");
        Ok(Self { workers })
    }

    /// Number of worker threads
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker, signalling all before joining any
    pub fn stop(&mut self) {
        for worker in &self.workers {
            worker.signal_stop();
        }
        for worker in &mut self.workers {
            worker.stop();
        }
    }
}
