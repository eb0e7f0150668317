//! CallContext trait: the completion handle passed to CPS sites
//!
//! The engine builds one context per asynchronous site call and hands it to the
//! site. The site must complete it exactly once, from any thread, at any time:
//! either by publishing a value or by halting. Sites never see engine
//! internals; they only program against this trait.

use crate::error::{CallError, SiteError};
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;

/// Shared completion handle for one site call
pub type CallHandle = Arc<dyn CallContext>;

/// Identity of a static call site in the running program
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSiteId(pub u64);

impl std::fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "callsite#{}", self.0)
    }
}

/// Key of a pending timer entry
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey(pub u64);

/// Deferred callback run by a timer
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Timer facility owned by the running execution.
///
/// Sites that wait on wall-clock time schedule through this service so that
/// stopping the execution also stops their pending timers.
pub trait TimerService: Send + Sync {
    /// Run `callback` once `delay` has elapsed
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerKey;

    /// Cancel a pending entry. Returns false if it already fired or was cancelled.
    fn cancel(&self, key: TimerKey) -> bool;
}

/// Completion handle for an asynchronous (CPS) site call.
///
/// Exactly one of [`publish`](Self::publish), [`halt`](Self::halt) or
/// [`fail`](Self::fail) must succeed per call. A second completion is rejected
/// with [`CallError::AlreadyCompleted`] and leaves the engine untouched.
pub trait CallContext: Send + Sync {
    /// Publish the call's single result
    fn publish(&self, value: Value) -> Result<(), CallError>;

    /// Complete the call without a result
    fn halt(&self) -> Result<(), CallError>;

    /// Complete the call without a result and report a site fault to the host
    fn fail(&self, error: SiteError) -> Result<(), CallError>;

    /// Whether the calling scope is still live. Long-running sites should poll this.
    fn is_live(&self) -> bool;

    /// Run `hook` if the calling scope is killed before the call completes.
    ///
    /// If the scope is already dead the hook runs immediately.
    fn on_cancel(&self, hook: Box<dyn FnOnce() + Send>);

    /// The static call site this call was issued from
    fn call_site(&self) -> CallSiteId;

    /// Timer facility of the running execution
    fn timer(&self) -> Arc<dyn TimerService>;
}
