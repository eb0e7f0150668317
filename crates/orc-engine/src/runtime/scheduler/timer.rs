//! Timer thread for delayed site completions
//!
//! Sites that wait on wall-clock time (e.g. `Rwait`) schedule a callback here
//! instead of blocking a worker. The thread waits for the next deadline using
//! condvar timeouts. Cancelled entries stay in the heap and are skipped when
//! they come due.

use orc_sdk::{TimerCallback, TimerKey, TimerService};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Heap entry; the callback itself lives in `pending`
struct TimerEntry {
    /// When to fire
    deadline: Instant,
    /// Key of the pending callback
    key: u64,
}

// Reverse ordering for min-heap (earliest deadline first)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.key == other.key
    }
}

impl Eq for TimerEntry {}

struct TimerState {
    /// Deadlines, earliest first
    heap: BinaryHeap<TimerEntry>,
    /// Callbacks not yet fired or cancelled
    pending: FxHashMap<u64, TimerCallback>,
}

/// Timer thread owned by one execution
pub struct TimerThread {
    /// Heap and callbacks
    state: Mutex<TimerState>,
    /// Wakes the thread for an earlier deadline or for shutdown
    notify: Condvar,
    shutdown: AtomicBool,
    /// Key generator
    next_key: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerThread {
    /// Create a timer; no thread runs until [`TimerThread::start`]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Spawn the timer thread under `name`
    pub fn start(self: &Arc<Self>, name: &str) -> std::io::Result<()> {
        let timer = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || timer.run_loop())?;

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop the timer thread. Pending callbacks are dropped without running.
    pub fn stop(&self) {
        self.shutdown.store(true, AtomicOrdering::Release);
        {
            // Notify under the lock so a thread about to wait cannot miss it.
            let _state = self.state.lock();
            self.notify.notify_one();
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        let dropped = {
            let mut state = self.state.lock();
            state.heap.clear();
            std::mem::take(&mut state.pending)
        };
        drop(dropped);
    }

    /// Fire due callbacks, then sleep until the next deadline
    fn run_loop(&self) {
        loop {
            let due = {
                let mut state = self.state.lock();

                // Re-check shutdown after acquiring lock to close race window.
                if self.shutdown.load(AtomicOrdering::Acquire) {
                    break;
                }

                let now = Instant::now();
                let mut due = Vec::new();
                while let Some(entry) = state.heap.peek() {
                    if entry.deadline > now {
                        break;
                    }
                    if let Some(entry) = state.heap.pop() {
                        if let Some(callback) = state.pending.remove(&entry.key) {
                            due.push(callback);
                        }
                    }
                }

                if due.is_empty() {
                    match state.heap.peek().map(|next| next.deadline) {
                        Some(deadline) => {
                            let timeout = deadline.saturating_duration_since(now);
                            self.notify.wait_for(&mut state, timeout);
                        }
                        None => self.notify.wait(&mut state),
                    }
                    continue;
                }
                due
            };

            // Run outside the lock: callbacks usually resume tasks.
            tracing::trace!(count = due.len(), "timers fired");
            for callback in due {
                callback();
            }
        }

        tracing::debug!("timer thread shutting down");
    }

    /// Number of callbacks waiting to fire
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl TimerService for TimerThread {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerKey {
        let key = self.next_key.fetch_add(1, AtomicOrdering::Relaxed);
        let deadline = Instant::now() + delay;
        let mut state = self.state.lock();
        state.pending.insert(key, callback);
        state.heap.push(TimerEntry { deadline, key });
        // The new deadline may be earlier than the one being waited on.
        self.notify.notify_one();
        TimerKey(key)
    }

    fn cancel(&self, key: TimerKey) -> bool {
        let removed = self.state.lock().pending.remove(&key.0);
        removed.is_some()
    }
}

impl Default for TimerThread {
    fn default() -> Self {
        Self {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                pending: FxHashMap::default(),
            }),
            notify: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_key: AtomicU64::new(1),
            handle: Mutex::new(None),
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.stop();
    }
}
