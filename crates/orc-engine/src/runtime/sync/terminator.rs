//! Hierarchical cooperative cancellation
//!
//! A `Terminator` is a kill flag plus the set of things that must die with it:
//! child terminators, pending site calls and plain hooks. Killing is
//! idempotent. Entries are drained under the lock and killed outside it, so a
//! hook may freely touch other terminators.
//!
//! Running code observes a kill only at checkpoints, via
//! [`Terminator::check_live`].

use crate::runtime::{RuntimeError, RuntimeResult};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Something that can be killed by a terminator
pub trait Killable: Send + Sync {
    /// Cancel this object. Must be idempotent.
    fn kill(&self);
}

/// Key of an entry registered with a terminator
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChildKey(u64);

static NEXT_CHILD_KEY: AtomicU64 = AtomicU64::new(1);

impl ChildKey {
    /// Allocate a fresh key
    pub fn new() -> Self {
        ChildKey(NEXT_CHILD_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ChildKey {
    fn default() -> Self {
        Self::new()
    }
}

enum Entry {
    Child(Weak<dyn Killable>),
    Hook(Box<dyn FnOnce() + Send>),
}

/// Cancellation broadcaster for one scope
pub struct Terminator {
    key: ChildKey,
    killed: AtomicBool,
    entries: Mutex<FxHashMap<ChildKey, Entry>>,
    parent: Option<Weak<Terminator>>,
}

impl Terminator {
    /// Create a top-level terminator
    pub fn root() -> Arc<Self> {
        Arc::new(Self::new(None))
    }

    /// Create a terminator that dies with `parent`.
    ///
    /// If `parent` is already dead the child is created dead.
    pub fn child(parent: &Arc<Terminator>) -> Arc<Self> {
        let child = Arc::new(Self::new(Some(Arc::downgrade(parent))));
        let weak: Weak<dyn Killable> = Arc::downgrade(&child) as Weak<dyn Killable>;
        if parent.add_child(child.key, weak).is_err() {
            child.killed.store(true, Ordering::Release);
        }
        child
    }

    fn new(parent: Option<Weak<Terminator>>) -> Self {
        Self {
            key: ChildKey::new(),
            killed: AtomicBool::new(false),
            entries: Mutex::new(FxHashMap::default()),
            parent,
        }
    }

    /// Kill this terminator and everything registered with it.
    ///
    /// Only the first call has any effect.
    pub fn kill(&self) {
        if self.killed.swap(true, Ordering::AcqRel) {
            return;
        }

        let entries = std::mem::take(&mut *self.entries.lock());
        tracing::debug!(terminator = self.key.0, entries = entries.len(), "terminator killed");

        for (_, entry) in entries {
            match entry {
                Entry::Child(child) => {
                    if let Some(child) = child.upgrade() {
                        child.kill();
                    }
                }
                Entry::Hook(hook) => hook(),
            }
        }
    }

    /// Whether this terminator has not been killed
    pub fn is_live(&self) -> bool {
        !self.killed.load(Ordering::Acquire)
    }

    /// Checkpoint: `Err(Killed)` once this terminator is dead
    pub fn check_live(&self) -> RuntimeResult<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(RuntimeError::Killed)
        }
    }

    /// Register `child` to be killed with this terminator.
    ///
    /// Returns `Err(Killed)` without registering if this terminator is already
    /// dead, so the caller can cancel the child itself.
    pub fn add_child(&self, key: ChildKey, child: Weak<dyn Killable>) -> RuntimeResult<()> {
        let mut entries = self.entries.lock();
        // Checked under the lock: kill() sets the flag before draining.
        if !self.is_live() {
            return Err(RuntimeError::Killed);
        }
        entries.insert(key, Entry::Child(child));
        Ok(())
    }

    /// Run `hook` when this terminator is killed.
    ///
    /// If it is already dead the hook runs immediately and `None` is returned.
    pub fn on_kill(&self, hook: impl FnOnce() + Send + 'static) -> Option<ChildKey> {
        let mut entries = self.entries.lock();
        if !self.is_live() {
            drop(entries);
            hook();
            return None;
        }
        let key = ChildKey::new();
        entries.insert(key, Entry::Hook(Box::new(hook)));
        Some(key)
    }

    /// Deregister an entry. Returns false if it was not registered.
    pub fn remove(&self, key: ChildKey) -> bool {
        self.entries.lock().remove(&key).is_some()
    }

    /// Deregister from the parent after natural completion
    pub fn detach(&self) {
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.remove(self.key);
        }
    }

    /// Number of registered children and hooks
    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Killable for Terminator {
    fn kill(&self) {
        Terminator::kill(self)
    }
}

impl fmt::Debug for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Terminator")
            .field("key", &self.key.0)
            .field("live", &self.is_live())
            .finish()
    }
}
