//! Execution context of a running task
//!
//! A [`Context`] names the scope a body runs in: the counter it holds a token
//! of, the terminator it checks, the sink its publications go to and how deep
//! it is nested in inlined calls. Bodies use it to spawn branches, force
//! futures, call targets and report publications.

use crate::config::EngineConfig;
use crate::runtime::closure::{Body, Closure, Code, Env, Outcome, Sink};
use crate::runtime::dispatch::CallSite;
use crate::runtime::execution::{Runtime, SiteFault};
use crate::runtime::scheduler::Task;
use crate::runtime::sync::{Counter, Future, Join, Resolution, Terminator};
use crate::runtime::{RuntimeError, RuntimeResult};
use orc_sdk::{CallSiteId, SiteError, TimerService, Value};
use std::fmt;
use std::sync::Arc;

/// Scope and runtime handle of the body being executed
#[derive(Clone)]
pub struct Context {
    runtime: Arc<Runtime>,
    counter: Arc<Counter>,
    terminator: Arc<Terminator>,
    sink: Sink,
    depth: usize,
}

impl Context {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        counter: Arc<Counter>,
        terminator: Arc<Terminator>,
        sink: Sink,
        depth: usize,
    ) -> Self {
        Self {
            runtime,
            counter,
            terminator,
            sink,
            depth,
        }
    }

    /// Counter of the current scope
    pub fn counter(&self) -> &Arc<Counter> {
        &self.counter
    }

    /// Terminator of the current scope
    pub fn terminator(&self) -> &Arc<Terminator> {
        &self.terminator
    }

    /// Where publications go
    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// Number of inlined spawns and calls below the running task
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        self.runtime.config()
    }

    /// Same scope, different sink
    pub fn with_sink(&self, sink: Sink) -> Self {
        Self {
            sink,
            ..self.clone()
        }
    }

    /// A different scope on the same runtime
    pub fn with_scope(&self, counter: Arc<Counter>, terminator: Arc<Terminator>, sink: Sink) -> Self {
        Self {
            counter,
            terminator,
            sink,
            ..self.clone()
        }
    }

    fn nested(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    /// Checkpoint: `Err(Killed)` once the scope's terminator is dead
    pub fn check_live(&self) -> RuntimeResult<()> {
        self.terminator.check_live()
    }

    /// Spawn `closure` as a new branch of the current scope.
    ///
    /// The branch may run inline when the engine judges it cheap. Nothing
    /// happens if the scope is already dead.
    pub fn spawn(&self, closure: Closure, args: Vec<Value>) {
        if !self.terminator.is_live() {
            return;
        }
        let task = Task::new(
            closure,
            args,
            self.sink.clone(),
            self.counter.clone(),
            self.terminator.clone(),
        );
        self.runtime.spawn(task, self.depth);
    }

    /// Queue `closure` to continue a suspended computation of this scope
    pub fn resume(&self, closure: Closure, args: Vec<Value>) {
        let task = Task::new(
            closure,
            args,
            self.sink.clone(),
            self.counter.clone(),
            self.terminator.clone(),
        );
        self.runtime.resume(task);
    }

    /// Hand `value` to the sink.
    ///
    /// The caller still owns its token and halts it afterwards.
    pub fn deliver(&self, value: Value) {
        match &self.sink {
            Sink::Host => {
                if self.terminator.is_live() {
                    self.runtime.publish(value);
                }
            }
            Sink::Then(frame) => {
                self.runtime.resume(Task::new(
                    frame.continuation().clone(),
                    vec![value],
                    frame.next().clone(),
                    self.counter.clone(),
                    self.terminator.clone(),
                ));
            }
            Sink::Notify(receiver) => receiver.receive(self, value),
        }
    }

    /// Apply a body's outcome to this context's token
    pub fn settle(&self, result: RuntimeResult<Outcome>) {
        match result {
            Ok(Outcome::Published(value)) => {
                self.deliver(value);
                self.counter.halt_token();
            }
            Ok(Outcome::Halted) | Err(RuntimeError::Killed) => self.counter.halt_token(),
            Ok(Outcome::Suspended) => {}
            Err(error) => {
                self.runtime.error(error);
                self.counter.halt_token();
            }
        }
    }

    /// Publish the value of `future`.
    ///
    /// A resolved future answers immediately. Otherwise the token moves to a
    /// reader that publishes once the future is bound, or halts if it stops.
    pub fn force(&self, future: &Arc<Future>) -> Outcome {
        match future.get() {
            Some(Resolution::Bound(value)) => return Outcome::Published(value),
            Some(Resolution::Stopped) => return Outcome::Halted,
            None => {}
        }

        let cx = self.clone();
        future.read(move |resolution: Resolution| {
            if let Resolution::Bound(value) = resolution {
                if cx.terminator.is_live() {
                    cx.deliver(value);
                }
            }
            cx.counter.halt_token();
        });
        Outcome::Suspended
    }

    /// Call `target` with `args` from `call_site`.
    ///
    /// A future target is forced first. Sites are strict: future arguments
    /// are forced, and a stopped argument halts the call. Closures receive
    /// their arguments unforced.
    pub fn call(
        &self,
        call_site: &Arc<CallSite>,
        target: &Value,
        args: &[Value],
    ) -> RuntimeResult<Outcome> {
        self.check_live()?;

        if let Some(future) = target.downcast_arc::<Future>() {
            return match future.get() {
                Some(Resolution::Bound(resolved)) => self.call(call_site, &resolved, args),
                Some(Resolution::Stopped) => Ok(Outcome::Halted),
                None => {
                    let cx = self.clone();
                    let site = call_site.clone();
                    let args = args.to_vec();
                    let join = Join::new(
                        1,
                        self.counter.clone(),
                        Box::new(move |mut values: Vec<Value>| {
                            let resolved = values.pop().unwrap_or(Value::Signal);
                            cx.resume_call(site, resolved, args);
                            cx.counter.halt_token();
                        }),
                    );
                    join.force(0, &future);
                    join.finish();
                    Ok(Outcome::Suspended)
                }
            };
        }

        if target.as_site().is_none() {
            return self.runtime.dispatcher().dispatch(self, call_site, target, args);
        }

        let mut values = args.to_vec();
        let mut pending = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            if let Some(future) = arg.downcast_arc::<Future>() {
                match future.get() {
                    Some(Resolution::Bound(value)) => values[index] = value,
                    Some(Resolution::Stopped) => return Ok(Outcome::Halted),
                    None => pending.push((index, future)),
                }
            }
        }

        if pending.is_empty() {
            return self.runtime.dispatcher().dispatch(self, call_site, target, &values);
        }

        let positions: Vec<usize> = pending.iter().map(|(index, _)| *index).collect();
        let cx = self.clone();
        let site = call_site.clone();
        let target = target.clone();
        let join = Join::new(
            pending.len(),
            self.counter.clone(),
            Box::new(move |forced: Vec<Value>| {
                for (index, value) in positions.into_iter().zip(forced) {
                    values[index] = value;
                }
                cx.resume_call(site, target, values);
                cx.counter.halt_token();
            }),
        );
        for (slot, (_, future)) in pending.iter().enumerate() {
            join.force(slot, future);
        }
        join.finish();
        Ok(Outcome::Suspended)
    }

    fn resume_call(&self, call_site: Arc<CallSite>, target: Value, args: Vec<Value>) {
        if !self.terminator.is_live() {
            return;
        }
        let code = Code::new("resume-call", args.len() + 1, ResumeCall { call_site });
        let mut task_args = Vec::with_capacity(args.len() + 1);
        task_args.push(target);
        task_args.extend(args);
        self.resume(Closure::new(code, Env::empty()), task_args);
    }

    /// Internal call of `closure` in the current scope.
    ///
    /// Runs on the caller's stack until the inline depth limit, then
    /// continues as a resumed task.
    pub fn call_closure(&self, closure: &Closure, args: &[Value]) -> RuntimeResult<Outcome> {
        let code = closure.code();
        if args.len() != code.arity() {
            return Err(RuntimeError::ArityMismatch {
                name: code.name().to_string(),
                expected: code.arity(),
                got: args.len(),
            });
        }

        if self.depth < self.runtime.config().max_inline_depth {
            return closure.execute(&self.nested(), args);
        }

        self.resume(closure.clone(), args.to_vec());
        Ok(Outcome::Halted)
    }

    /// Report a site fault to the host
    pub fn report_fault(&self, call_site: CallSiteId, site: &str, error: SiteError) {
        self.runtime.fault(SiteFault {
            call_site,
            site: site.to_string(),
            error,
        });
    }

    /// Timer facility of the execution
    pub fn timer(&self) -> Arc<dyn TimerService> {
        self.runtime.timer()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("counter", &self.counter.id())
            .field("live", &self.terminator.is_live())
            .field("sink", &self.sink)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Re-issues a call whose target or arguments had to be forced first.
///
/// Task arguments are the target followed by the call arguments.
struct ResumeCall {
    call_site: Arc<CallSite>,
}

impl Body for ResumeCall {
    fn execute(&self, cx: &Context, _env: &Env, args: &[Value]) -> RuntimeResult<Outcome> {
        match args.split_first() {
            Some((target, rest)) => cx.call(&self.call_site, target, rest),
            None => Err(RuntimeError::NotCallable("signal")),
        }
    }
}
