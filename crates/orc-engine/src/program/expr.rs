//! Program syntax

use crate::runtime::closure::{Closure, Env};
use crate::runtime::dispatch::CallSite;
use crate::runtime::RuntimeError;
use crate::runtime::RuntimeResult;
use orc_sdk::{Site, Value};
use std::sync::Arc;

/// An argument: a constant or a variable reference
#[derive(Debug, Clone)]
pub enum Arg {
    /// A constant value
    Const(Value),
    /// A variable by de Bruijn index (0 = innermost binding)
    Var(usize),
}

impl Arg {
    /// A site constant
    pub fn site(site: impl Site) -> Self {
        Arg::Const(Value::site(site))
    }

    /// Value of this argument in `env`
    pub fn resolve(&self, env: &Env) -> RuntimeResult<Value> {
        match self {
            Arg::Const(value) => Ok(value.clone()),
            Arg::Var(index) => env.get(*index).cloned().ok_or(RuntimeError::UnboundVariable(*index)),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Const(value)
    }
}

/// A combinator expression
#[derive(Debug, Clone)]
pub enum Expr {
    /// Halt without publishing
    Stop,
    /// Publish an argument; a future is published once it is bound
    Publish(Arg),
    /// Run both sides concurrently
    Parallel(Box<Expr>, Box<Expr>),
    /// Run the right side once per publication of the left side
    Sequence(Box<Expr>, Box<Expr>),
    /// Run both sides; the left side sees a future of the right side's first
    /// publication, after which the right side is killed
    Prune(Box<Expr>, Box<Expr>),
    /// Run the left side; run the right side only if the left side halts
    /// without publishing
    Otherwise(Box<Expr>, Box<Expr>),
    /// Call a site or closure
    Call {
        /// Static call site, shared by every evaluation of this expression
        call_site: Arc<CallSite>,
        /// Call target
        target: Arg,
        /// Call arguments
        args: Vec<Arg>,
    },
    /// Closure over the current environment
    Lambda {
        /// Diagnostic name
        name: String,
        /// Number of parameters, bound on top of the captured environment
        arity: usize,
        /// Body
        body: Box<Expr>,
    },
}

impl Expr {
    /// `stop`
    pub fn stop() -> Self {
        Expr::Stop
    }

    /// Publish a constant
    pub fn constant(value: Value) -> Self {
        Expr::Publish(Arg::Const(value))
    }

    /// Publish a variable
    pub fn var(index: usize) -> Self {
        Expr::Publish(Arg::Var(index))
    }

    /// `a | b`
    pub fn parallel(a: Expr, b: Expr) -> Self {
        Expr::Parallel(Box::new(a), Box::new(b))
    }

    /// `a >x> b`
    pub fn sequence(a: Expr, b: Expr) -> Self {
        Expr::Sequence(Box::new(a), Box::new(b))
    }

    /// `a <x< b`
    pub fn prune(a: Expr, b: Expr) -> Self {
        Expr::Prune(Box::new(a), Box::new(b))
    }

    /// `a ; b`
    pub fn otherwise(a: Expr, b: Expr) -> Self {
        Expr::Otherwise(Box::new(a), Box::new(b))
    }

    /// Call `target` with `args` from a new call site
    pub fn call(target: impl Into<Arg>, args: Vec<Arg>) -> Self {
        Expr::Call {
            call_site: CallSite::new(),
            target: target.into(),
            args,
        }
    }

    /// A closure taking `arity` arguments
    pub fn lambda(name: impl Into<String>, arity: usize, body: Expr) -> Self {
        Expr::Lambda {
            name: name.into(),
            arity,
            body: Box::new(body),
        }
    }

    /// Compile into a closure taking no arguments, ready to start
    pub fn compile(&self) -> Closure {
        Closure::new(super::eval::compile("main", 0, self), Env::empty())
    }
}
