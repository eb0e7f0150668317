//! Call dispatch
//!
//! Every call goes through its static [`CallSite`], whose cache maps the
//! target's shape to a resolved invoker. Closures run as internal calls;
//! sites with a direct invoker answer inline; every other site gets a
//! [`CpsCall`] handle and completes asynchronously.
//!
//! A site that panics is treated like a site that failed: the panic is
//! caught here, reported as a fault, and the calling branch halts.

mod cache;
mod cps;
mod invoker;

pub use cache::{CacheKind, CallSite, Resolved, Shape};
pub use cps::CpsCall;
pub use invoker::{DirectSiteInvoker, SiteInvoker};

use crate::runtime::closure::{Closure, Outcome};
use crate::runtime::context::Context;
use crate::runtime::sync::invariant_violated;
use crate::runtime::{panic_message, RuntimeError, RuntimeResult};
use orc_sdk::{CallContext, CallHandle, SiteError, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Resolves call targets and routes calls
pub struct Dispatcher {
    bound: usize,
    resolutions: AtomicU64,
}

impl Dispatcher {
    /// Dispatcher whose call-site caches hold at most `bound` shapes
    pub fn new(bound: usize) -> Self {
        Self {
            bound,
            resolutions: AtomicU64::new(0),
        }
    }

    /// Total resolutions performed across all call sites
    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// Resolve how `target` is invoked, without caching
    pub fn resolve(&self, target: &Value) -> RuntimeResult<Resolved> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);

        if let Some(site) = target.as_site() {
            let site_type = site.site_type();
            let resolved = if site.as_direct().is_some() {
                Resolved::Invoker(Arc::new(DirectSiteInvoker::new(site_type)))
            } else {
                Resolved::Invoker(Arc::new(SiteInvoker::new(site_type)))
            };
            tracing::trace!(site = site.name(), ?resolved, "resolved site");
            return Ok(resolved);
        }

        if Closure::from_value(target).is_some() {
            return Ok(Resolved::Closure);
        }

        Err(RuntimeError::NotCallable(target.type_name()))
    }

    /// Call `target` with fully forced `args` from `call_site`
    pub fn dispatch(
        &self,
        cx: &Context,
        call_site: &CallSite,
        target: &Value,
        args: &[Value],
    ) -> RuntimeResult<Outcome> {
        cx.check_live()?;

        let resolved = call_site.lookup(target, args, self.bound, |t: &Value| self.resolve(t))?;
        let invoker = match resolved {
            Resolved::Closure => {
                let closure = Closure::from_value(target)
                    .ok_or(RuntimeError::NotCallable(target.type_name()))?;
                return cx.call_closure(closure, args);
            }
            Resolved::Invoker(invoker) => invoker,
        };

        let name = target.as_site().map_or("<site>", |site| site.name());

        if let Some(direct) = invoker.as_direct() {
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| direct.invoke_direct(target, args)))
                    .unwrap_or_else(|payload| Err(site_panic(name, payload)));
            return match result {
                Ok(value) => Ok(Outcome::Published(value)),
                Err(error) => {
                    cx.report_fault(call_site.id(), name, error);
                    Ok(Outcome::Halted)
                }
            };
        }

        let call = CpsCall::start(cx, call_site.id(), name).ok_or(RuntimeError::Killed)?;
        let handle: CallHandle = call.clone();
        let invoked = panic::catch_unwind(AssertUnwindSafe(|| invoker.invoke(handle, target, args)));
        if let Err(payload) = invoked {
            cx.report_fault(call_site.id(), name, site_panic(name, payload));
            // The site may have completed the call before panicking.
            if !call.is_complete() {
                let _ = call.halt();
            }
        }
        Ok(Outcome::Suspended)
    }
}

/// Convert a panic raised inside a site into a site fault.
///
/// Panics from broken token invariants are not site faults and keep unwinding.
fn site_panic(site: &str, payload: Box<dyn Any + Send>) -> SiteError {
    if invariant_violated() {
        panic::resume_unwind(payload);
    }
    let message = panic_message(&*payload);
    tracing::debug!(site, message, "site panicked");
    SiteError::failed(format!("site panicked: {}", message))
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bound", &self.bound)
            .field("resolutions", &self.resolutions())
            .finish()
    }
}
