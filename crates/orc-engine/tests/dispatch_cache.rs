//! Integration tests for call-site caching and dispatch through the engine

mod common;

use common::*;
use orc_engine::{Arg, CacheKind, Engine, EngineConfig, Expr};
use orc_sdk::{CallHandle, Site, Value};
use std::sync::Arc;

fn call_site_of(expr: &Expr) -> Arc<orc_engine::CallSite> {
    match expr {
        Expr::Call { call_site, .. } => call_site.clone(),
        other => panic!("not a call: {:?}", other),
    }
}

#[test]
fn test_monomorphic_call_site_resolves_once() {
    let call = Expr::call(
        Arg::site(Add),
        vec![Arg::Const(Value::Int(1)), Arg::Const(Value::Int(2))],
    );
    let site = call_site_of(&call);

    // One worker, so the first call completes before any other starts.
    let engine = Engine::new(config(1));
    let log = run_on(&engine, &fan_out(1000, &call));

    assert_eq!(log.publications().len(), 1000);
    assert_eq!(site.resolutions(), 1);
    assert_eq!(site.kind(), CacheKind::Monomorphic);
}

macro_rules! signal_site {
    ($name:ident) => {
        struct $name;
        impl Site for $name {
            fn name(&self) -> &str {
                stringify!($name)
            }
            fn call(&self, ctx: CallHandle, _args: &[Value]) {
                let _ = ctx.publish(Value::Signal);
            }
        }
    };
}

signal_site!(S1);
signal_site!(S2);
signal_site!(S3);
signal_site!(S4);
signal_site!(S5);

#[test]
fn test_megamorphic_call_site_goes_generic() {
    // (S1 | S2 | S3 | S4 | S5) >f> f()
    let targets = Expr::parallel(
        Expr::parallel(
            Expr::constant(Value::site(S1)),
            Expr::constant(Value::site(S2)),
        ),
        Expr::parallel(
            Expr::constant(Value::site(S3)),
            Expr::parallel(
                Expr::constant(Value::site(S4)),
                Expr::constant(Value::site(S5)),
            ),
        ),
    );
    let call = Expr::call(Arg::Var(0), vec![]);
    let site = call_site_of(&call);
    let program = Expr::sequence(targets, call);

    let engine = Engine::new(EngineConfig {
        worker_count: 1,
        call_cache_bound: 2,
        ..EngineConfig::default()
    });

    let log = run_on(&engine, &program);
    assert_eq!(log.publications().len(), 5);
    assert_eq!(site.kind(), CacheKind::Generic);
    assert_eq!(site.resolutions(), 5);

    // Generic sites resolve every call and never cache again.
    run_on(&engine, &program);
    assert_eq!(site.kind(), CacheKind::Generic);
    assert_eq!(site.resolutions(), 10);
}

#[test]
fn test_polymorphic_within_bound() {
    let targets = Expr::parallel(
        Expr::constant(Value::site(S1)),
        Expr::constant(Value::site(S2)),
    );
    let call = Expr::call(Arg::Var(0), vec![]);
    let site = call_site_of(&call);
    let program = Expr::sequence(fan_out(8, &targets), call);

    let log = run_on(&Engine::new(config(1)), &program);
    assert_eq!(log.publications().len(), 16);
    assert_eq!(site.kind(), CacheKind::Polymorphic(2));
    assert_eq!(site.resolutions(), 2);
}

#[test]
fn test_stats_count_resolutions() {
    init_tracing();
    let call = Expr::call(Arg::site(Add), vec![Arg::Const(Value::Int(1)), Arg::Const(Value::Int(1))]);
    let log = orc_engine::EventLog::new();
    let mut handle = Engine::new(config(1))
        .start(fan_out(10, &call).compile(), log.clone())
        .unwrap();
    assert!(handle.wait_timeout(TIMEOUT));

    let stats = handle.stats();
    assert_eq!(stats.resolutions, 1);
    assert_eq!(stats.publications, 10);
    handle.shutdown();
}
