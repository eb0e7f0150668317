//! Closures, environments and publication sinks
//!
//! The front end hands the core a graph of [`Code`] objects, each exposing one
//! uniform [`Body::execute`] capability. A [`Closure`] pairs code with the
//! [`Env`] it captured. Executing a body ends in an [`Outcome`]; a published
//! value goes to the running task's [`Sink`].

use crate::runtime::context::Context;
use crate::runtime::RuntimeResult;
use orc_sdk::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Outcome
// ============================================================================

/// Terminal result of executing a body on behalf of a task
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Deliver this value to the task's sink, then halt the task's token
    Published(Value),
    /// Halt the task's token without a value
    Halted,
    /// The token was handed to a future read, join or site call that will
    /// resume the computation as a new task
    Suspended,
}

// ============================================================================
// Environment
// ============================================================================

struct EnvNode {
    value: Value,
    next: Env,
}

/// Persistent lexical environment.
///
/// Variables are addressed by de Bruijn index: 0 is the most recent binding.
#[derive(Clone, Default)]
pub struct Env(Option<Arc<EnvNode>>);

impl Env {
    /// The empty environment
    pub fn empty() -> Self {
        Env(None)
    }

    /// Extend with one binding
    pub fn bind(&self, value: Value) -> Self {
        Env(Some(Arc::new(EnvNode {
            value,
            next: self.clone(),
        })))
    }

    /// Extend with several bindings; the last one gets index 0
    pub fn bind_all(&self, values: &[Value]) -> Self {
        values.iter().fold(self.clone(), |env, v| env.bind(v.clone()))
    }

    /// Look up a binding by de Bruijn index
    pub fn get(&self, index: usize) -> Option<&Value> {
        let mut node = self.0.as_deref()?;
        for _ in 0..index {
            node = node.next.0.as_deref()?;
        }
        Some(&node.value)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut node = self.0.as_deref();
        while let Some(n) = node {
            len += 1;
            node = n.next.0.as_deref();
        }
        len
    }

    /// Whether there are no bindings
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Env(len={})", self.len())
    }
}

// ============================================================================
// Code
// ============================================================================

/// Executable body of a closure
pub trait Body: Send + Sync + 'static {
    /// Run the body for the task described by `cx`.
    ///
    /// `args` are the call arguments; `env` is the captured environment.
    fn execute(&self, cx: &Context, env: &Env, args: &[Value]) -> RuntimeResult<Outcome>;
}

impl<F> Body for F
where
    F: Fn(&Context, &Env, &[Value]) -> RuntimeResult<Outcome> + Send + Sync + 'static,
{
    fn execute(&self, cx: &Context, env: &Env, args: &[Value]) -> RuntimeResult<Outcome> {
        self(cx, env, args)
    }
}

/// Running average of execution time per call, used by the inlining heuristic
#[derive(Debug, Default)]
pub struct CallStats {
    calls: AtomicU64,
    total_nanos: AtomicU64,
}

impl CallStats {
    /// Record one execution
    pub fn record(&self, elapsed: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Number of recorded executions
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Average time per call, if any call was recorded
    pub fn time_per_call(&self) -> Option<Duration> {
        let calls = self.calls();
        if calls == 0 {
            return None;
        }
        Some(Duration::from_nanos(
            self.total_nanos.load(Ordering::Relaxed) / calls,
        ))
    }
}

/// Static code of a closure: a body plus its metadata
pub struct Code {
    name: String,
    arity: usize,
    must_spawn: bool,
    body: Box<dyn Body>,
    stats: CallStats,
}

impl Code {
    /// Wrap `body` taking `arity` arguments
    pub fn new(name: impl Into<String>, arity: usize, body: impl Body) -> Arc<Self> {
        Arc::new(Self::build(name, arity, body, false))
    }

    /// Like [`Code::new`], for code that must never be inlined into its spawner
    pub fn spawned(name: impl Into<String>, arity: usize, body: impl Body) -> Arc<Self> {
        Arc::new(Self::build(name, arity, body, true))
    }

    fn build(name: impl Into<String>, arity: usize, body: impl Body, must_spawn: bool) -> Self {
        Self {
            name: name.into(),
            arity,
            must_spawn,
            body: Box::new(body),
            stats: CallStats::default(),
        }
    }

    /// Name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of arguments the body expects
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Whether spawns of this code are always queued
    pub fn must_spawn(&self) -> bool {
        self.must_spawn
    }

    /// Execution statistics
    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    /// Execute the body directly, without arity checks
    pub fn run(&self, cx: &Context, env: &Env, args: &[Value]) -> RuntimeResult<Outcome> {
        self.body.execute(cx, env, args)
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Code")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("must_spawn", &self.must_spawn)
            .finish()
    }
}

/// Code paired with its captured environment
#[derive(Clone)]
pub struct Closure {
    code: Arc<Code>,
    env: Env,
}

impl Closure {
    /// Close `code` over `env`
    pub fn new(code: Arc<Code>, env: Env) -> Self {
        Self { code, env }
    }

    /// The closure's code
    pub fn code(&self) -> &Arc<Code> {
        &self.code
    }

    /// The captured environment
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Execute with `args`
    pub fn execute(&self, cx: &Context, args: &[Value]) -> RuntimeResult<Outcome> {
        self.code.run(cx, &self.env, args)
    }

    /// Wrap as a runtime value
    pub fn into_value(self) -> Value {
        Value::opaque(self)
    }

    /// Recover a closure from a runtime value
    pub fn from_value(value: &Value) -> Option<&Closure> {
        value.downcast_ref::<Closure>()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({})", self.code.name)
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Synchronous receiver of publications
pub trait Receiver: Send + Sync {
    /// Handle `value` published by the task described by `cx`.
    ///
    /// The publishing task's token is halted by the caller afterwards.
    fn receive(&self, cx: &Context, value: Value);
}

/// A pending continuation: publications resume `continuation` with one
/// argument, and its own publications go to `next`
pub struct Frame {
    continuation: Closure,
    next: Sink,
}

impl Frame {
    /// Create a frame
    pub fn new(continuation: Closure, next: Sink) -> Arc<Self> {
        Arc::new(Self { continuation, next })
    }

    /// The continuation resumed per publication
    pub fn continuation(&self) -> &Closure {
        &self.continuation
    }

    /// Where the continuation's publications go
    pub fn next(&self) -> &Sink {
        &self.next
    }
}

/// Destination of a task's publications
#[derive(Clone)]
pub enum Sink {
    /// Top-level publication to the host
    Host,
    /// Resume a continuation as a new task per publication
    Then(Arc<Frame>),
    /// Handle publications synchronously
    Notify(Arc<dyn Receiver>),
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Host => write!(f, "Host"),
            Sink::Then(frame) => write!(f, "Then({:?})", frame.continuation),
            Sink::Notify(_) => write!(f, "Notify"),
        }
    }
}
