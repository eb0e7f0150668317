//! Hierarchical completion counter
//!
//! A `Counter` tracks the live tokens of one combinator scope. Every spawned
//! task, suspended read and pending site call holds exactly one token; when the
//! last token halts the counter runs its on-zero action once and then releases
//! the token it holds on its parent, so completion propagates upward.
//!
//! A counter is created holding one token owned by its creator. The creator
//! spawns the scope's children and then halts that initial token.

use parking_lot::Mutex;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Action run when a counter reaches zero
pub type ZeroAction = Box<dyn FnOnce() + Send>;

static NEXT_COUNTER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static VIOLATED: Cell<bool> = const { Cell::new(false) };
}

/// Whether a token invariant was broken on this thread.
///
/// Panic handlers at the site boundary re-raise such panics instead of
/// converting them into site faults.
pub fn invariant_violated() -> bool {
    VIOLATED.with(Cell::get)
}

#[cold]
fn violation(args: fmt::Arguments<'_>) -> ! {
    VIOLATED.with(|violated| violated.set(true));
    tracing::error!("{}", args);
    panic!("{}", args)
}

/// Live-work accountant for one scope
pub struct Counter {
    id: u64,
    count: AtomicUsize,
    on_zero: Mutex<Option<ZeroAction>>,
    parent: Option<Arc<Counter>>,
}

impl Counter {
    /// Create a top-level counter holding the creator's token
    pub fn root(on_zero: impl FnOnce() + Send + 'static) -> Arc<Self> {
        Arc::new(Self::with_parent(None, Box::new(on_zero)))
    }

    /// Create a counter nested in `parent`.
    ///
    /// The new counter holds one token on `parent` until it reaches zero.
    pub fn nested(parent: &Arc<Counter>, on_zero: impl FnOnce() + Send + 'static) -> Arc<Self> {
        parent.new_token();
        Arc::new(Self::with_parent(Some(parent.clone()), Box::new(on_zero)))
    }

    fn with_parent(parent: Option<Arc<Counter>>, on_zero: ZeroAction) -> Self {
        Self {
            id: NEXT_COUNTER_ID.fetch_add(1, Ordering::Relaxed),
            count: AtomicUsize::new(1),
            on_zero: Mutex::new(Some(on_zero)),
            parent,
        }
    }

    /// Issue a new token.
    ///
    /// # Panics
    ///
    /// Panics if the counter already reached zero: a completed scope can
    /// never gain work again.
    pub fn new_token(&self) {
        let prev = self.count.fetch_add(1, Ordering::AcqRel);
        if prev == 0 {
            violation(format_args!("token issued on completed counter #{}", self.id));
        }
    }

    /// Halt one token, firing the on-zero action if it was the last.
    ///
    /// # Panics
    ///
    /// Panics on underflow: every halt must pair with an issued token.
    pub fn halt_token(&self) {
        let prev = match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev,
            Err(_) => violation(format_args!("counter #{} halted below zero", self.id)),
        };

        if prev == 1 {
            self.fire();
        }
    }

    /// Halt the token of a branch known to contribute no further work
    pub fn set_halted(&self) {
        self.halt_token();
    }

    fn fire(&self) {
        tracing::debug!(counter = self.id, "counter reached zero");

        let action = self.on_zero.lock().take();
        if let Some(action) = action {
            action();
        }

        if let Some(parent) = &self.parent {
            parent.halt_token();
        }
    }

    /// Current number of live tokens
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether every token has halted
    pub fn is_done(&self) -> bool {
        self.count() == 0
    }

    /// Counter identity, for diagnostics
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Parent counter, if nested
    pub fn parent(&self) -> Option<&Arc<Counter>> {
        self.parent.as_ref()
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("id", &self.id)
            .field("count", &self.count())
            .field("nested", &self.parent.is_some())
            .finish()
    }
}
