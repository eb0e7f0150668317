//! N-ary future join with fail-fast
//!
//! A `Join` waits for N slots to be filled. Each slot is either set directly
//! or forced from a future. Once every slot holds a value the continuation
//! runs exactly once with all values in slot order; if any forced future stops
//! first, the join fails, drops the continuation and halts its counter token.
//!
//! The pending count starts at N + 1. The extra count is removed by
//! [`Join::finish`] after all slots have been registered, so the join cannot
//! fire while it is still being set up.

use crate::runtime::sync::{Counter, Future, Resolution};
use orc_sdk::Value;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Continuation run with all slot values once the join is complete.
///
/// It takes over the join's counter token.
pub type JoinContinuation = Box<dyn FnOnce(Vec<Value>) + Send>;

const BLOCKED: u8 = 0;
const RESOLVED: u8 = 1;
const HALTED: u8 = 2;

/// Aggregator over N futures
pub struct Join {
    slots: Mutex<Vec<Option<Value>>>,
    pending: AtomicUsize,
    state: AtomicU8,
    continuation: Mutex<Option<JoinContinuation>>,
    counter: Arc<Counter>,
}

impl Join {
    /// Create a join over `n` slots.
    ///
    /// `counter` is the token the join holds while blocked; the caller
    /// transfers one live token to the join.
    pub fn new(n: usize, counter: Arc<Counter>, continuation: JoinContinuation) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(vec![None; n]),
            pending: AtomicUsize::new(n + 1),
            state: AtomicU8::new(BLOCKED),
            continuation: Mutex::new(Some(continuation)),
            counter,
        })
    }

    /// Fill slot `index` with an already available value
    pub fn set(&self, index: usize, value: Value) {
        self.slots.lock()[index] = Some(value);
        self.arrive();
    }

    /// Fill slot `index` from `future` once it resolves
    pub fn force(self: &Arc<Self>, index: usize, future: &Future) {
        let join = self.clone();
        future.read(move |resolution: Resolution| match resolution {
            Resolution::Bound(value) => join.set(index, value),
            Resolution::Stopped => join.halt(),
        });
    }

    /// Mark slot registration as complete
    pub fn finish(&self) {
        self.arrive();
    }

    fn arrive(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.fire();
        }
    }

    fn fire(&self) {
        if self
            .state
            .compare_exchange(BLOCKED, RESOLVED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let values: Vec<Value> = std::mem::take(&mut *self.slots.lock())
            .into_iter()
            .map(|slot| slot.unwrap_or(Value::Signal))
            .collect();
        let continuation = self.continuation.lock().take();

        tracing::trace!(slots = values.len(), "join resolved");
        if let Some(continuation) = continuation {
            continuation(values);
        }
    }

    /// Fail the join: the continuation is dropped and the counter token halted.
    ///
    /// Only the first failure has any effect.
    pub fn halt(&self) {
        if self
            .state
            .compare_exchange(BLOCKED, HALTED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.continuation.lock().take();
        tracing::trace!("join halted");
        self.counter.halt_token();
    }

    /// Whether the continuation has run
    pub fn is_resolved(&self) -> bool {
        self.state.load(Ordering::Acquire) == RESOLVED
    }

    /// Whether the join failed
    pub fn is_halted(&self) -> bool {
        self.state.load(Ordering::Acquire) == HALTED
    }
}
