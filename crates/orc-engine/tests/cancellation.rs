//! Integration tests for execution control: halting, CPS call handles,
//! timers and the task bound

mod common;

use common::*;
use orc_engine::{Arg, Engine, EngineConfig, EventLog, Expr, RuntimeError};
use orc_sdk::{CallError, CallHandle, Site, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_halt_cancels_pending_calls() {
    init_tracing();
    let hang = Hang::default();
    let call = Expr::call(Arg::Const(Value::site(hang.clone())), vec![]);
    let program = Expr::parallel(call.clone(), call);

    let log = EventLog::new();
    let handle = Engine::new(config(2)).start(program.compile(), log.clone()).unwrap();

    assert!(!handle.wait_timeout(Duration::from_millis(50)));
    assert!(!handle.is_done());
    assert_eq!(hang.pending(), 2);

    handle.halt();
    assert!(handle.wait_timeout(TIMEOUT));
    assert!(log.is_halted());
    assert_eq!(hang.cancelled(), 2);

    // Completing a cancelled call is rejected.
    for call in hang.calls.lock().iter() {
        assert!(!call.is_live());
        assert_eq!(call.publish(Value::Int(1)), Err(CallError::Cancelled));
    }
    assert!(log.publications().is_empty());
}

#[test]
fn test_halt_cancels_timers() {
    init_tracing();
    let later = Arg::site(Later {
        delay: Duration::from_secs(60),
    });
    let program = Expr::call(later, vec![Arg::Const(Value::Int(1))]);

    let log = EventLog::new();
    let handle = Engine::new(config(1)).start(program.compile(), log.clone()).unwrap();
    thread::sleep(Duration::from_millis(20));
    handle.halt();

    assert!(handle.wait_timeout(TIMEOUT));
    assert!(log.publications().is_empty());
}

/// Publishes twice and records what the second attempt returned
#[derive(Clone, Default)]
struct Twice {
    second: Arc<Mutex<Option<Result<(), CallError>>>>,
}

impl Site for Twice {
    fn name(&self) -> &str {
        "Twice"
    }
    fn call(&self, ctx: CallHandle, _args: &[Value]) {
        let _ = ctx.publish(Value::Int(1));
        *self.second.lock() = Some(ctx.publish(Value::Int(2)));
    }
}

#[test]
fn test_second_completion_is_rejected() {
    let twice = Twice::default();
    let log = run(&Expr::call(Arg::Const(Value::site(twice.clone())), vec![]));

    assert_eq!(sorted_ints(&log), vec![1]);
    assert_eq!(*twice.second.lock(), Some(Err(CallError::AlreadyCompleted)));
}

/// Drops its call handle without completing it
struct Forget;

impl Site for Forget {
    fn name(&self) -> &str {
        "Forget"
    }
    fn call(&self, ctx: CallHandle, _args: &[Value]) {
        drop(ctx);
    }
}

#[test]
fn test_dropped_handle_halts_the_call() {
    // Forget() ; 5
    let program = Expr::otherwise(Expr::call(Arg::site(Forget), vec![]), int(5));
    assert_eq!(sorted_ints(&run(&program)), vec![5]);
}

/// Completes from another thread after a short pause
struct Slow;

impl Site for Slow {
    fn name(&self) -> &str {
        "Slow"
    }
    fn call(&self, ctx: CallHandle, args: &[Value]) {
        let value = args.first().cloned().unwrap_or(Value::Signal);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(1));
            let _ = ctx.publish(value);
        });
    }
}

#[test]
fn test_cps_calls_from_many_branches() {
    let call = Expr::call(Arg::site(Slow), vec![Arg::Const(Value::Int(1))]);
    let log = run(&fan_out(200, &call));
    assert_eq!(log.publications().len(), 200);
}

#[test]
fn test_task_bound_degrades_to_inline() {
    let engine = Engine::new(EngineConfig {
        worker_count: 2,
        max_outstanding_tasks: Some(1),
        allow_spawn_inlining: false,
        ..EngineConfig::default()
    });
    let log = run_on(&engine, &fan_out(256, &int(1)));
    assert_eq!(log.publications().len(), 256);
}

#[test]
fn test_task_bound_halts_spawns_past_inline_limit() {
    init_tracing();
    let engine = Engine::new(EngineConfig {
        worker_count: 1,
        max_outstanding_tasks: Some(2),
        allow_spawn_inlining: false,
        max_inline_depth: 0,
        ..EngineConfig::default()
    });
    // 1 | (1 | (... | 1)): the root spawns 49 left branches while the only
    // worker is busy running it.
    let chain = (1..50).fold(int(1), |rest, _| Expr::parallel(int(1), rest));

    let log = EventLog::new();
    let mut handle = engine.start(chain.compile(), log.clone()).unwrap();
    assert!(handle.wait_timeout(TIMEOUT));

    let stats = handle.stats();
    assert_eq!(stats.tasks_spawned, 2);
    assert_eq!(stats.tasks_refused, 47);
    assert_eq!(stats.tasks_inlined, 0);
    assert_eq!(stats.outstanding, 0);
    handle.shutdown();

    assert_eq!(log.publications().len(), 3);
    let errors = log.errors();
    assert_eq!(errors.len(), 47);
    assert!(errors
        .iter()
        .all(|e| matches!(e, RuntimeError::ResourceExhausted(_))));
}

#[test]
fn test_inlining_disabled_queues_every_spawn() {
    init_tracing();
    let engine = Engine::new(EngineConfig {
        worker_count: 2,
        allow_spawn_inlining: false,
        ..EngineConfig::default()
    });

    let log = EventLog::new();
    let mut handle = engine.start(fan_out(64, &int(1)).compile(), log.clone()).unwrap();
    assert!(handle.wait_timeout(TIMEOUT));

    let stats = handle.stats();
    assert_eq!(stats.tasks_inlined, 0);
    assert_eq!(stats.tasks_spawned, 63);
    assert_eq!(stats.publications, 64);
    assert_eq!(handle.worker_count(), 2);
    handle.shutdown();
}

#[test]
fn test_drop_handle_stops_execution() {
    init_tracing();
    let hang = Hang::default();
    let program = Expr::call(Arg::Const(Value::site(hang.clone())), vec![]);
    let log = EventLog::new();
    let handle = Engine::new(config(1)).start(program.compile(), log.clone()).unwrap();
    thread::sleep(Duration::from_millis(20));

    drop(handle);
    assert_eq!(hang.cancelled(), 1);
    assert!(log.is_halted());
}
