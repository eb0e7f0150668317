//! Shared helpers for engine integration tests

#![allow(dead_code)]

use orc_engine::{Engine, EngineConfig, EventLog, Expr};
use orc_sdk::{Args, CallHandle, DirectSite, Site, SiteError, SiteResult, TimerKey, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(workers: usize) -> EngineConfig {
    EngineConfig {
        worker_count: workers,
        ..EngineConfig::default()
    }
}

/// Run `expr` to completion on `engine` and return its event log
pub fn run_on(engine: &Engine, expr: &Expr) -> Arc<EventLog> {
    init_tracing();
    let log = EventLog::new();
    let mut handle = engine.start(expr.compile(), log.clone()).unwrap();
    assert!(handle.wait_timeout(TIMEOUT), "execution did not complete");
    handle.shutdown();
    log
}

pub fn run(expr: &Expr) -> Arc<EventLog> {
    run_on(&Engine::new(config(4)), expr)
}

pub fn sorted_ints(log: &EventLog) -> Vec<i64> {
    let mut ints: Vec<i64> = log
        .publications()
        .iter()
        .map(|v| v.as_int().expect("integer publication"))
        .collect();
    ints.sort_unstable();
    ints
}

pub fn int(n: i64) -> Expr {
    Expr::constant(Value::Int(n))
}

/// Balanced tree of `n` parallel copies of `leaf`
pub fn fan_out(n: usize, leaf: &Expr) -> Expr {
    if n <= 1 {
        leaf.clone()
    } else {
        let half = n / 2;
        Expr::parallel(fan_out(half, leaf), fan_out(n - half, leaf))
    }
}

// ============================================================================
// Test sites
// ============================================================================

/// Direct integer addition
pub struct Add;

impl Site for Add {
    fn name(&self) -> &str {
        "Add"
    }
    fn call(&self, ctx: CallHandle, args: &[Value]) {
        let _ = match self.call_direct(args) {
            Ok(v) => ctx.publish(v),
            Err(e) => ctx.fail(e),
        };
    }
    fn as_direct(&self) -> Option<&dyn DirectSite> {
        Some(self)
    }
}

impl DirectSite for Add {
    fn call_direct(&self, args: &[Value]) -> SiteResult<Value> {
        let args = Args::new("Add", args).exactly(2)?;
        Ok(Value::Int(args.int(0)? + args.int(1)?))
    }
}

/// Direct site that always fails
pub struct Fail;

impl Site for Fail {
    fn name(&self) -> &str {
        "Fail"
    }
    fn call(&self, ctx: CallHandle, _args: &[Value]) {
        let _ = ctx.fail(SiteError::failed("boom"));
    }
    fn as_direct(&self) -> Option<&dyn DirectSite> {
        Some(self)
    }
}

impl DirectSite for Fail {
    fn call_direct(&self, _args: &[Value]) -> SiteResult<Value> {
        Err(SiteError::failed("boom"))
    }
}

/// CPS site publishing its argument after a delay on the execution's timer
pub struct Later {
    pub delay: Duration,
}

impl Site for Later {
    fn name(&self) -> &str {
        "Later"
    }
    fn call(&self, ctx: CallHandle, args: &[Value]) {
        let value = args.first().cloned().unwrap_or(Value::Signal);
        let timer = ctx.timer();
        let handle = ctx.clone();
        let key: TimerKey = timer.schedule(
            self.delay,
            Box::new(move || {
                let _ = handle.publish(value);
            }),
        );
        ctx.on_cancel(Box::new(move || {
            timer.cancel(key);
        }));
    }
}

/// CPS site that never completes on its own and counts cancellations
#[derive(Clone, Default)]
pub struct Hang {
    pub calls: Arc<Mutex<Vec<CallHandle>>>,
    pub cancelled: Arc<AtomicUsize>,
}

impl Hang {
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Site for Hang {
    fn name(&self) -> &str {
        "Hang"
    }
    fn call(&self, ctx: CallHandle, _args: &[Value]) {
        let cancelled = self.cancelled.clone();
        ctx.on_cancel(Box::new(move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        }));
        self.calls.lock().push(ctx);
    }
}
