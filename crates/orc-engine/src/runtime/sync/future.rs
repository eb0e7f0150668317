//! Write-once dataflow cell
//!
//! A `Future` moves exactly once from unbound to bound or stopped. Readers
//! registered before that transition are drained under the same lock that
//! performs it and resumed after the lock is released; readers registered
//! after it are resumed immediately.

use orc_sdk::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Resolved state of a future, as seen by readers
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The producer published this value
    Bound(Value),
    /// The producer halted without publishing
    Stopped,
}

/// Error for a second resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FutureError {
    /// The future was already bound or stopped; nothing changed
    #[error("future already resolved")]
    AlreadyResolved,
}

/// Continuation waiting on a future
pub trait FutureReader: Send {
    /// Called exactly once with the future's resolution
    fn resolve(self: Box<Self>, resolution: Resolution);
}

impl<F> FutureReader for F
where
    F: FnOnce(Resolution) + Send,
{
    fn resolve(self: Box<Self>, resolution: Resolution) {
        (*self)(resolution)
    }
}

enum FutureState {
    Unbound(Vec<Box<dyn FutureReader>>),
    Bound(Value),
    Stopped,
}

/// Write-once synchronization cell
pub struct Future {
    state: Mutex<FutureState>,
}

impl Future {
    /// Create an unbound future
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FutureState::Unbound(Vec::new())),
        }
    }

    /// Create a shared unbound future
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Bind the future to `value` and resume every pending reader
    pub fn bind(&self, value: Value) -> Result<(), FutureError> {
        self.resolve(Resolution::Bound(value))
    }

    /// Stop the future and resume every pending reader with the stop signal
    pub fn stop(&self) -> Result<(), FutureError> {
        self.resolve(Resolution::Stopped)
    }

    fn resolve(&self, resolution: Resolution) -> Result<(), FutureError> {
        let readers = {
            let mut state = self.state.lock();
            let readers = match &mut *state {
                FutureState::Unbound(readers) => std::mem::take(readers),
                _ => return Err(FutureError::AlreadyResolved),
            };
            *state = match &resolution {
                Resolution::Bound(value) => FutureState::Bound(value.clone()),
                Resolution::Stopped => FutureState::Stopped,
            };
            readers
        };

        tracing::trace!(
            readers = readers.len(),
            bound = matches!(resolution, Resolution::Bound(_)),
            "future resolved"
        );

        for reader in readers {
            reader.resolve(resolution.clone());
        }
        Ok(())
    }

    /// Register a reader.
    ///
    /// If the future is already resolved the reader runs immediately on the
    /// calling thread.
    pub fn read(&self, reader: impl FutureReader + 'static) {
        let resolution = {
            let mut state = self.state.lock();
            match &mut *state {
                FutureState::Unbound(readers) => {
                    readers.push(Box::new(reader));
                    return;
                }
                FutureState::Bound(value) => Resolution::Bound(value.clone()),
                FutureState::Stopped => Resolution::Stopped,
            }
        };
        Box::new(reader).resolve(resolution);
    }

    /// Resolution if already resolved, without registering a reader
    pub fn get(&self) -> Option<Resolution> {
        match &*self.state.lock() {
            FutureState::Unbound(_) => None,
            FutureState::Bound(value) => Some(Resolution::Bound(value.clone())),
            FutureState::Stopped => Some(Resolution::Stopped),
        }
    }

    /// Whether the future has left the unbound state
    pub fn is_resolved(&self) -> bool {
        !matches!(&*self.state.lock(), FutureState::Unbound(_))
    }

    /// Number of readers waiting
    pub fn pending_readers(&self) -> usize {
        match &*self.state.lock() {
            FutureState::Unbound(readers) => readers.len(),
            _ => 0,
        }
    }
}

impl Default for Future {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.lock() {
            FutureState::Unbound(readers) => write!(f, "Future(unbound, {} readers)", readers.len()),
            FutureState::Bound(value) => write!(f, "Future(bound {:?})", value),
            FutureState::Stopped => write!(f, "Future(stopped)"),
        }
    }
}
