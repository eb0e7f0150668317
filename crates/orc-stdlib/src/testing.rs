//! Call handle and timer doubles for site unit tests

use orc_sdk::{
    CallContext, CallError, CallHandle, CallSiteId, SiteError, TimerCallback, TimerKey,
    TimerService, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Published(Value),
    Halted,
    Failed(SiteError),
    Cancelled,
}

/// Timer that fires only when told to
#[derive(Default)]
pub struct ManualTimer {
    entries: Mutex<Vec<(TimerKey, Duration, Option<TimerCallback>)>>,
}

impl ManualTimer {
    pub fn fire_all(&self) {
        let callbacks: Vec<TimerCallback> = self
            .entries
            .lock()
            .iter_mut()
            .filter_map(|(_, _, callback)| callback.take())
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn pending(&self) -> usize {
        self.entries.lock().iter().filter(|(_, _, cb)| cb.is_some()).count()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.entries.lock().iter().map(|(_, delay, _)| *delay).collect()
    }
}

impl TimerService for ManualTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerKey {
        let mut entries = self.entries.lock();
        let key = TimerKey(entries.len() as u64);
        entries.push((key, delay, Some(callback)));
        key
    }

    fn cancel(&self, key: TimerKey) -> bool {
        self.entries
            .lock()
            .iter_mut()
            .find(|(k, _, _)| *k == key)
            .and_then(|(_, _, callback)| callback.take())
            .is_some()
    }
}

/// Call handle that records how it was completed
pub struct RecordingCall {
    completion: Mutex<Option<Completion>>,
    hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    timer: Arc<ManualTimer>,
}

impl RecordingCall {
    pub fn new() -> Arc<Self> {
        Self::with_timer(Arc::new(ManualTimer::default()))
    }

    pub fn with_timer(timer: Arc<ManualTimer>) -> Arc<Self> {
        Arc::new(Self {
            completion: Mutex::new(None),
            hooks: Mutex::new(Vec::new()),
            timer,
        })
    }

    pub fn handle(self: &Arc<Self>) -> CallHandle {
        self.clone()
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion.lock().clone()
    }

    pub fn cancel(&self) {
        {
            let mut completion = self.completion.lock();
            if completion.is_some() {
                return;
            }
            *completion = Some(Completion::Cancelled);
        }
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
    }

    fn complete(&self, completion: Completion) -> Result<(), CallError> {
        let mut slot = self.completion.lock();
        match &*slot {
            None => {
                *slot = Some(completion);
                Ok(())
            }
            Some(Completion::Cancelled) => Err(CallError::Cancelled),
            Some(_) => Err(CallError::AlreadyCompleted),
        }
    }
}

impl CallContext for RecordingCall {
    fn publish(&self, value: Value) -> Result<(), CallError> {
        self.complete(Completion::Published(value))
    }

    fn halt(&self) -> Result<(), CallError> {
        self.complete(Completion::Halted)
    }

    fn fail(&self, error: SiteError) -> Result<(), CallError> {
        self.complete(Completion::Failed(error))
    }

    fn is_live(&self) -> bool {
        self.completion.lock().is_none()
    }

    fn on_cancel(&self, hook: Box<dyn FnOnce() + Send>) {
        if matches!(*self.completion.lock(), Some(Completion::Cancelled)) {
            hook();
            return;
        }
        self.hooks.lock().push(hook);
    }

    fn call_site(&self) -> CallSiteId {
        CallSiteId(0)
    }

    fn timer(&self) -> Arc<dyn TimerService> {
        self.timer.clone()
    }
}
