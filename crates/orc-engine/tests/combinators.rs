//! Integration tests for the combinators: parallel, sequence, pruning and
//! otherwise, run end to end on the multi-threaded engine

mod common;

use common::*;
use orc_engine::{Arg, Engine, EventSink, Expr, RuntimeError};
use orc_sdk::{CallHandle, DirectSite, Site, SiteResult, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sink counting halt notifications
#[derive(Default)]
struct CountingSink {
    values: parking_lot::Mutex<Vec<Value>>,
    halted: AtomicUsize,
    values_at_halt: AtomicUsize,
}

impl EventSink for CountingSink {
    fn publish(&self, value: Value) {
        self.values.lock().push(value);
    }

    fn halted(&self) {
        self.values_at_halt
            .store(self.values.lock().len(), Ordering::SeqCst);
        self.halted.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_parallel_publishes_both_and_halts_once() {
    init_tracing();
    let sink = Arc::new(CountingSink::default());
    let program = Expr::parallel(int(1), int(2));

    let handle = Engine::new(config(4))
        .start(program.compile(), sink.clone())
        .unwrap();
    assert!(handle.wait_timeout(TIMEOUT));

    let mut values: Vec<i64> = sink.values.lock().iter().filter_map(Value::as_int).collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);
    assert_eq!(sink.halted.load(Ordering::SeqCst), 1);
    // Halt is reported only after both publications.
    assert_eq!(sink.values_at_halt.load(Ordering::SeqCst), 2);
}

#[test]
fn test_wide_parallel() {
    let program = fan_out(500, &int(7));
    let log = run(&program);
    assert_eq!(log.publications().len(), 500);
    assert!(log.is_halted());
}

#[test]
fn test_stop_publishes_nothing() {
    let log = run(&Expr::stop());
    assert!(log.publications().is_empty());
    assert!(log.is_halted());
}

#[test]
fn test_sequence_runs_right_per_publication() {
    // (1 | 2) >x> Add(x, 10)
    let program = Expr::sequence(
        Expr::parallel(int(1), int(2)),
        Expr::call(Arg::site(Add), vec![Arg::Var(0), Arg::Const(Value::Int(10))]),
    );
    assert_eq!(sorted_ints(&run(&program)), vec![11, 12]);
}

#[test]
fn test_sequence_after_async_publication() {
    // Later(5) >x> Add(x, x)
    let later = Arg::site(Later {
        delay: Duration::from_millis(5),
    });
    let program = Expr::sequence(
        Expr::call(later, vec![Arg::Const(Value::Int(5))]),
        Expr::call(Arg::site(Add), vec![Arg::Var(0), Arg::Var(0)]),
    );
    assert_eq!(sorted_ints(&run(&program)), vec![10]);
}

#[test]
fn test_prune_right_side_halting_halts_readers() {
    // (x | x) <x< stop
    let program = Expr::prune(Expr::parallel(Expr::var(0), Expr::var(0)), Expr::stop());
    let log = run(&program);
    assert!(log.publications().is_empty());
    assert!(log.is_halted());
}

#[test]
fn test_prune_keeps_first_publication() {
    // x <x< (1 | Later(2))
    let later = Arg::site(Later {
        delay: Duration::from_millis(200),
    });
    let program = Expr::prune(
        Expr::var(0),
        Expr::parallel(int(1), Expr::call(later, vec![Arg::Const(Value::Int(2))])),
    );
    assert_eq!(sorted_ints(&run(&program)), vec![1]);
}

#[test]
fn test_prune_cancels_pending_site_call() {
    // x <x< (Later(1) | Hang())
    let hang = Hang::default();
    let later = Arg::site(Later {
        delay: Duration::from_millis(50),
    });
    let program = Expr::prune(
        Expr::var(0),
        Expr::parallel(
            Expr::call(later, vec![Arg::Const(Value::Int(1))]),
            Expr::call(Arg::Const(Value::site(hang.clone())), vec![]),
        ),
    );

    let log = run(&program);
    assert_eq!(sorted_ints(&log), vec![1]);
    assert_eq!(hang.pending(), 1);
    assert_eq!(hang.cancelled(), 1);
}

#[test]
fn test_prune_left_runs_without_waiting() {
    // 3 <x< Later(4): the left side does not read x
    let later = Arg::site(Later {
        delay: Duration::from_millis(20),
    });
    let program = Expr::prune(int(3), Expr::call(later, vec![Arg::Const(Value::Int(4))]));
    assert_eq!(sorted_ints(&run(&program)), vec![3]);
}

#[test]
fn test_otherwise_skips_right_after_publication() {
    assert_eq!(sorted_ints(&run(&Expr::otherwise(int(1), int(2)))), vec![1]);
}

#[test]
fn test_otherwise_runs_right_after_silent_halt() {
    let program = Expr::otherwise(Expr::parallel(Expr::stop(), Expr::stop()), int(3));
    assert_eq!(sorted_ints(&run(&program)), vec![3]);
}

#[test]
fn test_otherwise_waits_for_async_left() {
    let later = Arg::site(Later {
        delay: Duration::from_millis(10),
    });
    let program = Expr::otherwise(Expr::call(later, vec![Arg::Const(Value::Int(1))]), int(2));
    assert_eq!(sorted_ints(&run(&program)), vec![1]);
}

#[test]
fn test_otherwise_right_starts_exactly_once() {
    // (stop | stop | Fail()) ; (5 | 6)
    let left = Expr::parallel(
        Expr::parallel(Expr::stop(), Expr::stop()),
        Expr::call(Arg::site(Fail), vec![]),
    );
    let log = run(&Expr::otherwise(left, Expr::parallel(int(5), int(6))));
    assert_eq!(sorted_ints(&log), vec![5, 6]);
    assert_eq!(log.faults().len(), 1);
}

#[test]
fn test_call_forces_future_arguments() {
    // Add(x, 1) <x< Later(41)
    let later = Arg::site(Later {
        delay: Duration::from_millis(10),
    });
    let program = Expr::prune(
        Expr::call(Arg::site(Add), vec![Arg::Var(0), Arg::Const(Value::Int(1))]),
        Expr::call(later, vec![Arg::Const(Value::Int(41))]),
    );
    assert_eq!(sorted_ints(&run(&program)), vec![42]);
}

#[test]
fn test_call_with_stopped_argument_halts() {
    // Add(x, 1) <x< stop
    let program = Expr::prune(
        Expr::call(Arg::site(Add), vec![Arg::Var(0), Arg::Const(Value::Int(1))]),
        Expr::stop(),
    );
    let log = run(&program);
    assert!(log.publications().is_empty());
    assert!(log.faults().is_empty());
}

#[test]
fn test_lambda_call_through_future() {
    // f(3) <f< (lambda(x) = Add(x, x))
    let double = Expr::lambda(
        "double",
        1,
        Expr::call(Arg::site(Add), vec![Arg::Var(0), Arg::Var(0)]),
    );
    let program = Expr::prune(
        Expr::call(Arg::Var(0), vec![Arg::Const(Value::Int(3))]),
        double,
    );
    assert_eq!(sorted_ints(&run(&program)), vec![6]);
}

#[test]
fn test_lambda_arity_mismatch_is_reported() {
    let program = Expr::sequence(
        Expr::lambda("unary", 1, Expr::var(0)),
        Expr::call(Arg::Var(0), vec![]),
    );
    let log = run(&program);
    assert!(log.publications().is_empty());
    assert!(matches!(
        log.errors().as_slice(),
        [RuntimeError::ArityMismatch { expected: 1, got: 0, .. }]
    ));
}

#[test]
fn test_site_fault_halts_only_the_caller() {
    let program = Expr::parallel(Expr::call(Arg::site(Fail), vec![]), int(1));
    let log = run(&program);

    assert_eq!(sorted_ints(&log), vec![1]);
    let faults = log.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].site, "Fail");
    assert!(log.errors().is_empty());
}

#[test]
fn test_calling_a_non_callable_value() {
    let log = run(&Expr::call(Arg::Const(Value::Int(3)), vec![]));
    assert_eq!(log.errors(), vec![RuntimeError::NotCallable("integer")]);
}

/// Direct site whose implementation panics
struct Boom;

impl Site for Boom {
    fn name(&self) -> &str {
        "Boom"
    }
    fn call(&self, _ctx: CallHandle, _args: &[Value]) {
        panic!("site bug");
    }
    fn as_direct(&self) -> Option<&dyn DirectSite> {
        Some(self)
    }
}

impl DirectSite for Boom {
    fn call_direct(&self, _args: &[Value]) -> SiteResult<Value> {
        panic!("site bug");
    }
}

/// CPS site that panics, optionally after publishing its argument
struct PanicAfter {
    publish: bool,
}

impl Site for PanicAfter {
    fn name(&self) -> &str {
        "PanicAfter"
    }
    fn call(&self, ctx: CallHandle, args: &[Value]) {
        if self.publish {
            let _ = ctx.publish(args[0].clone());
        }
        panic!("callback bug");
    }
}

#[test]
fn test_panicking_direct_site_is_a_fault() {
    let program = Expr::parallel(Expr::call(Arg::site(Boom), vec![]), int(1));
    let log = run_on(&Engine::new(config(2)), &program);

    assert_eq!(sorted_ints(&log), vec![1]);
    let faults = log.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].site, "Boom");
    assert_eq!(faults[0].error.to_string(), "site panicked: site bug");
    assert!(log.errors().is_empty());
    assert!(log.is_halted());
}

#[test]
fn test_panicking_cps_site_halts_its_call() {
    let program = Expr::parallel(
        Expr::call(Arg::site(PanicAfter { publish: false }), vec![]),
        int(1),
    );
    let log = run_on(&Engine::new(config(2)), &program);

    assert_eq!(sorted_ints(&log), vec![1]);
    let faults = log.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].site, "PanicAfter");
    assert_eq!(faults[0].error.to_string(), "site panicked: callback bug");
}

#[test]
fn test_cps_site_panicking_after_publishing_keeps_the_value() {
    let call = Expr::call(
        Arg::site(PanicAfter { publish: true }),
        vec![Arg::Const(Value::Int(7))],
    );
    let log = run_on(&Engine::new(config(2)), &Expr::parallel(call, int(1)));

    assert_eq!(sorted_ints(&log), vec![1, 7]);
    assert_eq!(log.faults().len(), 1);
    assert!(log.is_halted());
}
