//! Per-call-site target cache
//!
//! Each static call site caches the invokers it resolved, keyed by the shape
//! of the call target. The cache only grows or gives up:
//!
//! ```text
//! Empty -> Monomorphic -> Polymorphic (<= bound entries) -> Generic
//! ```
//!
//! Once a site has seen more shapes than the bound it turns generic and
//! resolves on every call without caching.

use crate::runtime::closure::Closure;
use crate::runtime::{RuntimeError, RuntimeResult};
use orc_sdk::{CallSiteId, Invoker, Value};
use parking_lot::Mutex;
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shape of a call target, the cache key
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A site, by implementation type
    Site(TypeId),
    /// A closure, by code identity
    Closure(usize),
}

impl Shape {
    /// Shape of `target`, or `NotCallable`
    pub fn of(target: &Value) -> RuntimeResult<Self> {
        if let Some(site) = target.as_site() {
            return Ok(Shape::Site(site.site_type()));
        }
        if let Some(closure) = Closure::from_value(target) {
            return Ok(Shape::Closure(Arc::as_ptr(closure.code()) as usize));
        }
        Err(RuntimeError::NotCallable(target.type_name()))
    }
}

/// How a call target is invoked
#[derive(Clone)]
pub enum Resolved {
    /// Internal call of a closure
    Closure,
    /// External site call through an invoker
    Invoker(Arc<dyn Invoker>),
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Closure => write!(f, "Closure"),
            Resolved::Invoker(invoker) => {
                write!(f, "Invoker(direct={})", invoker.as_direct().is_some())
            }
        }
    }
}

struct Entry {
    shape: Shape,
    resolved: Resolved,
}

impl Entry {
    fn matches(&self, shape: Shape, target: &Value, args: &[Value]) -> bool {
        self.shape == shape
            && match &self.resolved {
                Resolved::Closure => true,
                Resolved::Invoker(invoker) => invoker.can_invoke(target, args),
            }
    }
}

enum CacheState {
    Empty,
    Monomorphic(Entry),
    Polymorphic(Vec<Entry>),
    Generic,
}

/// Observable state of a call-site cache
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheKind {
    /// Nothing resolved yet
    Empty,
    /// One cached shape
    Monomorphic,
    /// This many cached shapes
    Polymorphic(usize),
    /// Caching disabled
    Generic,
}

static NEXT_CALL_SITE: AtomicU64 = AtomicU64::new(1);

/// A static call site with its target cache
pub struct CallSite {
    id: CallSiteId,
    state: Mutex<CacheState>,
    resolutions: AtomicU64,
}

impl CallSite {
    /// Create a call site with an empty cache
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: CallSiteId(NEXT_CALL_SITE.fetch_add(1, Ordering::Relaxed)),
            state: Mutex::new(CacheState::Empty),
            resolutions: AtomicU64::new(0),
        })
    }

    /// Identity reported in fault records
    pub fn id(&self) -> CallSiteId {
        self.id
    }

    /// Number of resolutions this site performed
    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// Current cache state
    pub fn kind(&self) -> CacheKind {
        match &*self.state.lock() {
            CacheState::Empty => CacheKind::Empty,
            CacheState::Monomorphic(_) => CacheKind::Monomorphic,
            CacheState::Polymorphic(entries) => CacheKind::Polymorphic(entries.len()),
            CacheState::Generic => CacheKind::Generic,
        }
    }

    /// Find the invoker for `target`, resolving and caching on a miss.
    ///
    /// `resolve` runs outside the cache lock.
    pub fn lookup(
        &self,
        target: &Value,
        args: &[Value],
        bound: usize,
        resolve: impl FnOnce(&Value) -> RuntimeResult<Resolved>,
    ) -> RuntimeResult<Resolved> {
        let shape = Shape::of(target)?;

        {
            let state = self.state.lock();
            let hit = match &*state {
                CacheState::Monomorphic(entry) => {
                    Some(entry).filter(|e| e.matches(shape, target, args))
                }
                CacheState::Polymorphic(entries) => {
                    entries.iter().find(|e| e.matches(shape, target, args))
                }
                CacheState::Empty | CacheState::Generic => None,
            };
            if let Some(entry) = hit {
                return Ok(entry.resolved.clone());
            }
        }

        let resolved = resolve(target)?;
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        self.insert(shape, resolved.clone(), bound);
        Ok(resolved)
    }

    fn insert(&self, shape: Shape, resolved: Resolved, bound: usize) {
        let mut state = self.state.lock();
        let entry = Entry { shape, resolved };

        let next = match std::mem::replace(&mut *state, CacheState::Generic) {
            CacheState::Empty if bound >= 1 => CacheState::Monomorphic(entry),
            CacheState::Monomorphic(existing) if existing.shape == shape => {
                // Another thread resolved the same shape first.
                CacheState::Monomorphic(existing)
            }
            CacheState::Monomorphic(existing) if bound >= 2 => {
                CacheState::Polymorphic(vec![existing, entry])
            }
            CacheState::Polymorphic(entries) if entries.iter().any(|e| e.shape == shape) => {
                CacheState::Polymorphic(entries)
            }
            CacheState::Polymorphic(mut entries) if entries.len() < bound => {
                entries.push(entry);
                CacheState::Polymorphic(entries)
            }
            CacheState::Generic => CacheState::Generic,
            _ => {
                tracing::warn!(call_site = %self.id, bound, "call site cache turned generic");
                CacheState::Generic
            }
        };

        *state = next;
        tracing::trace!(call_site = %self.id, ?shape, "call site cache updated");
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .finish()
    }
}
