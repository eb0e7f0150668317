//! Name registry for the standard sites
//!
//! Hosts resolving free site names in a program look them up here.

use crate::arith::{Add, Div, Equal, Greater, Less, Mul, Sub};
use crate::logic::{Error, Iff, Ift, Let};
use crate::semaphore::SemaphoreFactory;
use crate::time::Rwait;
use once_cell::sync::Lazy;
use orc_sdk::SiteRegistry;

static STDLIB: Lazy<SiteRegistry> = Lazy::new(|| {
    let mut registry = SiteRegistry::new();
    register_stdlib(&mut registry);
    tracing::debug!(sites = registry.len(), "standard sites registered");
    registry
});

/// Register every standard site under its name
pub fn register_stdlib(registry: &mut SiteRegistry) {
    register_arith(registry);
    register_logic(registry);
    registry.register(Rwait);
    registry.register(SemaphoreFactory);
}

fn register_arith(registry: &mut SiteRegistry) {
    registry.register(Add);
    registry.register(Sub);
    registry.register(Mul);
    registry.register(Div);
    registry.register(Equal);
    registry.register(Less);
    registry.register(Greater);
}

fn register_logic(registry: &mut SiteRegistry) {
    registry.register(Ift);
    registry.register(Iff);
    registry.register(Let);
    registry.register(Error);
}

/// Shared registry holding the standard sites
pub fn stdlib() -> &'static SiteRegistry {
    &STDLIB
}
