//! Site and Invoker traits: the call contract between engine and site library
//!
//! A [`Site`] is an externally implemented operation. Sites that always
//! complete synchronously without blocking also implement [`DirectSite`] so the
//! engine can call them inline and use the result immediately.
//!
//! An [`Invoker`] is what the engine caches per call site: a resolved way of
//! invoking targets of one shape. `can_invoke` is re-checked on every cache hit.

use crate::context::CallHandle;
use crate::error::SiteResult;
use crate::value::{SiteRef, Value};
use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::sync::Arc;

// ============================================================================
// Sites
// ============================================================================

/// An externally implemented callable operation
pub trait Site: Send + Sync + 'static {
    /// Name used in diagnostics and fault records
    fn name(&self) -> &str;

    /// Asynchronous entry point.
    ///
    /// The site must eventually complete `ctx` exactly once, from any thread.
    fn call(&self, ctx: CallHandle, args: &[Value]);

    /// Synchronous view of this site, if it has one
    fn as_direct(&self) -> Option<&dyn DirectSite> {
        None
    }

    /// Concrete type identity, used as the call-site cache key
    fn site_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// A site that always answers synchronously without blocking
pub trait DirectSite: Site {
    /// Compute the result. Errors are genuine site faults.
    fn call_direct(&self, args: &[Value]) -> SiteResult<Value>;
}

// ============================================================================
// Invokers
// ============================================================================

/// Resolved way of invoking one shape of call target
pub trait Invoker: Send + Sync {
    /// Whether this invoker handles `target` called with `args`
    fn can_invoke(&self, target: &Value, args: &[Value]) -> bool;

    /// Invoke asynchronously; the invoker must complete `ctx` exactly once
    fn invoke(&self, ctx: CallHandle, target: &Value, args: &[Value]);

    /// Synchronous view of this invoker, if the target supports direct calls
    fn as_direct(&self) -> Option<&dyn DirectInvoker> {
        None
    }
}

/// Invoker for targets that complete synchronously
pub trait DirectInvoker: Invoker {
    /// Invoke and return the result immediately.
    ///
    /// Returns an error only for a genuine site-level fault.
    fn invoke_direct(&self, target: &Value, args: &[Value]) -> SiteResult<Value>;
}

// ============================================================================
// Site Registry (name-based lookup)
// ============================================================================

/// Registry of sites indexed by name.
///
/// Site libraries register their sites here (e.g. "Ift", "Rwait"); hosts and
/// front ends look them up by name when building programs.
pub struct SiteRegistry {
    sites: FxHashMap<String, SiteRef>,
}

impl SiteRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            sites: FxHashMap::default(),
        }
    }

    /// Register a site under its own name
    pub fn register(&mut self, site: impl Site) {
        let site: SiteRef = Arc::new(site);
        self.sites.insert(site.name().to_string(), site);
    }

    /// Register an already shared site under an explicit name
    pub fn register_as(&mut self, name: &str, site: SiteRef) {
        self.sites.insert(name.to_string(), site);
    }

    /// Get a site by name
    pub fn get(&self, name: &str) -> Option<SiteRef> {
        self.sites.get(name).cloned()
    }

    /// Get a site by name as a value
    pub fn value(&self, name: &str) -> Option<Value> {
        self.get(name).map(Value::Site)
    }

    /// Check if a site is registered
    pub fn contains(&self, name: &str) -> bool {
        self.sites.contains_key(name)
    }

    /// Get the number of registered sites
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Site for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn call(&self, ctx: CallHandle, args: &[Value]) {
            let _ = ctx.publish(args.first().cloned().unwrap_or(Value::Signal));
        }
    }

    struct Other;

    impl Site for Other {
        fn name(&self) -> &str {
            "Other"
        }

        fn call(&self, ctx: CallHandle, _args: &[Value]) {
            let _ = ctx.halt();
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = SiteRegistry::new();
        registry.register(Echo);

        assert!(registry.contains("Echo"));
        assert!(!registry.contains("Missing"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Echo").unwrap().name(), "Echo");
    }

    #[test]
    fn test_registry_alias() {
        let mut registry = SiteRegistry::new();
        registry.register_as("E", Arc::new(Echo));
        assert!(registry.value("E").is_some());
        assert!(registry.value("Echo").is_none());
    }

    #[test]
    fn test_site_type_distinguishes_implementations() {
        let a: SiteRef = Arc::new(Echo);
        let b: SiteRef = Arc::new(Echo);
        let c: SiteRef = Arc::new(Other);
        assert_eq!(a.site_type(), b.site_type());
        assert_ne!(a.site_type(), c.site_type());
        assert!(a.as_direct().is_none());
    }
}
