//! Orc Execution Engine
//!
//! This crate provides the concurrent execution core for Orc programs:
//! - **Sync**: futures, joins, counters and terminators (`runtime::sync`)
//! - **Scheduler**: work-stealing task queues and worker threads (`runtime::scheduler`)
//! - **Dispatch**: call-site caches, direct and CPS site calls (`runtime::dispatch`)
//! - **Execution**: engine entry point and host events (`runtime::execution`)
//! - **Program**: combinator expressions compiled onto closures (`program`)
//!
//! # Example
//!
//! ```rust,ignore
//! use orc_engine::{Arg, Engine, EngineConfig, Expr};
//! use orc_sdk::Value;
//!
//! // 1 | 2
//! let program = Expr::parallel(Expr::constant(Value::Int(1)), Expr::constant(Value::Int(2)));
//!
//! let engine = Engine::new(EngineConfig::default());
//! let log = engine.run(program.compile())?;
//! assert_eq!(log.publications().len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Engine configuration
pub mod config;

/// Combinator programs
pub mod program;

/// Execution core
pub mod runtime;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigError, EngineConfig};
pub use program::{Arg, Expr};
pub use runtime::{
    Body, CacheKind, CallSite, Closure, Code, Context, Counter, Engine, Env, EventLog, EventSink,
    ExecutionHandle, Future, Join, Outcome, Resolution, RuntimeError, RuntimeResult,
    SchedulerStats, Sink, SiteFault, Terminator,
};
