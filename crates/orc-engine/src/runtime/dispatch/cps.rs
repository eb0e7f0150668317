//! Completion handle for asynchronous site calls
//!
//! A `CpsCall` owns the calling task's counter token from dispatch until the
//! site completes it. It is registered with the caller's terminator, so
//! killing the scope completes the call as halted and runs the site's cancel
//! hooks. Exactly one completion wins; later attempts are rejected.

use crate::runtime::context::Context;
use crate::runtime::sync::{ChildKey, Killable};
use orc_sdk::{CallContext, CallError, CallSiteId, SiteError, TimerService, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Call handle passed to CPS sites
pub struct CpsCall {
    cx: Context,
    call_site: CallSiteId,
    site: String,
    key: ChildKey,
    state: AtomicU8,
    hooks: Mutex<Vec<CancelHook>>,
}

impl CpsCall {
    /// Take over the token of the task described by `cx`.
    ///
    /// Returns `None` if the caller's scope is already dead; the token then
    /// stays with the caller.
    pub fn start(cx: &Context, call_site: CallSiteId, site: &str) -> Option<Arc<Self>> {
        let call = Arc::new(Self {
            cx: cx.clone(),
            call_site,
            site: site.to_string(),
            key: ChildKey::new(),
            state: AtomicU8::new(PENDING),
            hooks: Mutex::new(Vec::new()),
        });

        let weak: Weak<dyn Killable> = Arc::downgrade(&call) as Weak<dyn Killable>;
        if cx.terminator().add_child(call.key, weak).is_err() {
            // Never handed out: disarm the drop guard.
            call.state.store(COMPLETED, Ordering::Release);
            return None;
        }
        Some(call)
    }

    fn complete(&self) -> Result<(), CallError> {
        match self
            .state
            .compare_exchange(PENDING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.cx.terminator().remove(self.key);
                self.hooks.lock().clear();
                Ok(())
            }
            Err(CANCELLED) => Err(CallError::Cancelled),
            Err(_) => {
                tracing::warn!(call_site = %self.call_site, site = %self.site, "call handle completed twice");
                Err(CallError::AlreadyCompleted)
            }
        }
    }

    /// Whether the call has been completed or cancelled
    pub fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) != PENDING
    }
}

impl CallContext for CpsCall {
    fn publish(&self, value: Value) -> Result<(), CallError> {
        self.complete()?;
        // Resumption checkpoint: a publication from a killed scope is dropped.
        if self.cx.terminator().is_live() {
            self.cx.deliver(value);
        }
        self.cx.counter().halt_token();
        Ok(())
    }

    fn halt(&self) -> Result<(), CallError> {
        self.complete()?;
        self.cx.counter().halt_token();
        Ok(())
    }

    fn fail(&self, error: SiteError) -> Result<(), CallError> {
        self.complete()?;
        self.cx.report_fault(self.call_site, &self.site, error);
        self.cx.counter().halt_token();
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING && self.cx.terminator().is_live()
    }

    fn on_cancel(&self, hook: Box<dyn FnOnce() + Send>) {
        let mut hooks = self.hooks.lock();
        match self.state.load(Ordering::Acquire) {
            PENDING => hooks.push(hook),
            CANCELLED => {
                drop(hooks);
                hook();
            }
            _ => {}
        }
    }

    fn call_site(&self) -> CallSiteId {
        self.call_site
    }

    fn timer(&self) -> Arc<dyn TimerService> {
        self.cx.timer()
    }
}

impl Killable for CpsCall {
    fn kill(&self) {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let hooks = std::mem::take(&mut *self.hooks.lock());
        tracing::trace!(call_site = %self.call_site, hooks = hooks.len(), "site call cancelled");
        for hook in hooks {
            hook();
        }
        self.cx.counter().halt_token();
    }
}

impl Drop for CpsCall {
    fn drop(&mut self) {
        if self
            .state
            .compare_exchange(PENDING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::warn!(
                call_site = %self.call_site,
                site = %self.site,
                "call handle dropped without completion; halting"
            );
            self.cx.terminator().remove(self.key);
            self.cx.counter().halt_token();
        }
    }
}
