//! Counting semaphore sites
//!
//! `Semaphore(n)` publishes a fresh semaphore with `n` permits. The
//! semaphore itself is a site taking a method name:
//!
//! | Call                 | Effect                                          |
//! |----------------------|-------------------------------------------------|
//! | `s("acquire")`       | take a permit, waiting in FIFO order if none    |
//! | `s("release")`       | hand a permit to the oldest waiter, or keep it  |
//! | `s("permits")`       | publish the number of free permits              |
//!
//! Waiting never blocks a worker thread: the waiter's call handle is queued
//! and completed by a later `release`. A waiter whose caller is killed
//! leaves the queue.

use orc_sdk::{Args, CallHandle, Site, SiteError, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Unique identifier for a semaphore
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SemaphoreId(u64);

impl SemaphoreId {
    /// Create a new unique semaphore ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SemaphoreId {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised by semaphore calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemaphoreError {
    /// `Semaphore(n)` with `n < 0`
    #[error("Semaphore: invalid permit count {0}")]
    InvalidCount(i64),

    /// Method name not understood
    #[error("Semaphore: unknown method {0:?}")]
    UnknownMethod(String),
}

impl From<SemaphoreError> for SiteError {
    fn from(error: SemaphoreError) -> Self {
        SiteError::failed(error.to_string())
    }
}

struct State {
    permits: u64,
    next_waiter: u64,
    waiters: VecDeque<(u64, CallHandle)>,
}

struct Inner {
    id: SemaphoreId,
    state: Mutex<State>,
}

/// A counting semaphore
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

impl Semaphore {
    /// Create a semaphore with `permits` free permits
    pub fn new(permits: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: SemaphoreId::new(),
                state: Mutex::new(State {
                    permits,
                    next_waiter: 0,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// The semaphore's ID
    pub fn id(&self) -> SemaphoreId {
        self.inner.id
    }

    /// Number of free permits
    pub fn available_permits(&self) -> u64 {
        self.inner.state.lock().permits
    }

    /// Number of queued acquirers
    pub fn waiting_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    fn acquire(&self, ctx: CallHandle) {
        let waiter = {
            let mut state = self.inner.state.lock();
            if state.permits > 0 {
                state.permits -= 1;
                None
            } else {
                let waiter = state.next_waiter;
                state.next_waiter += 1;
                state.waiters.push_back((waiter, ctx.clone()));
                Some(waiter)
            }
        };

        match waiter {
            None => {
                let _ = ctx.publish(Value::Signal);
            }
            Some(waiter) => {
                tracing::trace!(semaphore = ?self.inner.id, waiter, "acquire waiting");
                let inner: Weak<Inner> = Arc::downgrade(&self.inner);
                ctx.on_cancel(Box::new(move || {
                    if let Some(inner) = inner.upgrade() {
                        inner.state.lock().waiters.retain(|(id, _)| *id != waiter);
                    }
                }));
            }
        }
    }

    fn release(&self) {
        loop {
            let next = {
                let mut state = self.inner.state.lock();
                match state.waiters.pop_front() {
                    Some((_, waiter)) => waiter,
                    None => {
                        state.permits += 1;
                        return;
                    }
                }
            };
            // A waiter cancelled since it was queued cannot take the permit.
            if next.publish(Value::Signal).is_ok() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Semaphore")
            .field("id", &self.inner.id)
            .field("permits", &state.permits)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

impl Site for Semaphore {
    fn name(&self) -> &str {
        "Semaphore"
    }

    fn call(&self, ctx: CallHandle, args: &[Value]) {
        let method = match Args::new("Semaphore", args).exactly(1).and_then(|args| args.str(0)) {
            Ok(method) => method,
            Err(error) => {
                let _ = ctx.fail(error);
                return;
            }
        };

        match method {
            "acquire" => self.acquire(ctx),
            "release" => {
                self.release();
                let _ = ctx.publish(Value::Signal);
            }
            "permits" => {
                let permits = i64::try_from(self.available_permits()).unwrap_or(i64::MAX);
                let _ = ctx.publish(Value::Int(permits));
            }
            other => {
                let _ = ctx.fail(SemaphoreError::UnknownMethod(other.to_string()).into());
            }
        }
    }
}

/// `Semaphore(n)`: publishes a new semaphore with `n` permits
#[derive(Debug, Default, Clone, Copy)]
pub struct SemaphoreFactory;

impl Site for SemaphoreFactory {
    fn name(&self) -> &str {
        "Semaphore"
    }

    fn call(&self, ctx: CallHandle, args: &[Value]) {
        let result = Args::new("Semaphore", args)
            .exactly(1)
            .and_then(|args| args.int(0))
            .and_then(|n| u64::try_from(n).map_err(|_| SemaphoreError::InvalidCount(n).into()));
        let _ = match result {
            Ok(permits) => ctx.publish(Value::site(Semaphore::new(permits))),
            Err(error) => ctx.fail(error),
        };
    }
}
