//! Execution core: sync primitives, scheduler, dispatcher and executions

pub mod closure;
pub mod context;
pub mod dispatch;
pub mod execution;
pub mod scheduler;
pub mod sync;

pub use closure::{Body, CallStats, Closure, Code, Env, Frame, Outcome, Receiver, Sink};
pub use context::Context;
pub use dispatch::{CallSite, CacheKind, Dispatcher, Shape};
pub use execution::{Engine, EventLog, EventSink, ExecutionHandle, SiteFault};
pub use scheduler::{SchedulerStats, SpawnError, Task, TaskId};
pub use sync::{Counter, Future, FutureError, Join, Resolution, Terminator};

use crate::config::ConfigError;
use orc_sdk::SiteError;
use std::any::Any;

/// Errors raised while executing a body
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// A checkpoint observed a dead terminator. Converted to a silent halt.
    #[error("scope was killed")]
    Killed,

    /// A resource bound refused work
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Called a value that is neither a site nor a closure
    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),

    /// Closure called with the wrong number of arguments
    #[error("{name}: expected {expected} arguments, got {got}")]
    ArityMismatch {
        /// Closure name
        name: String,
        /// Declared arity
        expected: usize,
        /// Supplied arguments
        got: usize,
    },

    /// Variable index outside the environment
    #[error("unbound variable #{0}")]
    UnboundVariable(usize),

    /// Site fault raised outside a dispatch
    #[error(transparent)]
    Site(#[from] SiteError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Runtime result type
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Message carried by a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
