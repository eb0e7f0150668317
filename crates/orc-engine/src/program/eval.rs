//! Evaluation of combinator programs
//!
//! Every sub-expression that may run as its own task (a parallel branch, a
//! sequence continuation, the right side of a pruning or otherwise, a lambda
//! body) is compiled to its own [`Code`] block.

use crate::program::expr::{Arg, Expr};
use crate::runtime::closure::{Body, Closure, Code, Env, Frame, Outcome, Receiver, Sink};
use crate::runtime::context::Context;
use crate::runtime::dispatch::CallSite;
use crate::runtime::sync::{Counter, Future, Terminator};
use crate::runtime::RuntimeResult;
use orc_sdk::Value;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

enum Node {
    Stop,
    Publish(Arg),
    Parallel(Arc<Code>, Arc<Code>),
    Sequence(Arc<Code>, Arc<Code>),
    Prune(Arc<Code>, Arc<Code>),
    Otherwise(Arc<Code>, Arc<Code>),
    Call {
        call_site: Arc<CallSite>,
        target: Arg,
        args: Vec<Arg>,
    },
    Lambda(Arc<Code>),
}

/// A compiled expression. Arguments are bound on top of the environment.
struct Block {
    node: Node,
}

impl Body for Block {
    fn execute(&self, cx: &Context, env: &Env, args: &[Value]) -> RuntimeResult<Outcome> {
        if args.is_empty() {
            eval(&self.node, cx, env)
        } else {
            eval(&self.node, cx, &env.bind_all(args))
        }
    }
}

pub(crate) fn compile(name: &str, arity: usize, expr: &Expr) -> Arc<Code> {
    Code::new(name, arity, Block { node: lower(expr) })
}

fn lower(expr: &Expr) -> Node {
    match expr {
        Expr::Stop => Node::Stop,
        Expr::Publish(arg) => Node::Publish(arg.clone()),
        Expr::Parallel(a, b) => Node::Parallel(compile("par-left", 0, a), compile("par-right", 0, b)),
        Expr::Sequence(a, b) => Node::Sequence(compile("seq-left", 0, a), compile("seq-right", 1, b)),
        Expr::Prune(a, b) => Node::Prune(
            compile("prune-left", 0, a),
            Code::spawned("prune-right", 0, Block { node: lower(b) }),
        ),
        Expr::Otherwise(a, b) => {
            Node::Otherwise(compile("otherwise-left", 0, a), compile("otherwise-right", 0, b))
        }
        Expr::Call {
            call_site,
            target,
            args,
        } => Node::Call {
            call_site: call_site.clone(),
            target: target.clone(),
            args: args.clone(),
        },
        Expr::Lambda { name, arity, body } => Node::Lambda(compile(name, *arity, body)),
    }
}

fn eval(node: &Node, cx: &Context, env: &Env) -> RuntimeResult<Outcome> {
    match node {
        Node::Stop => Ok(Outcome::Halted),

        Node::Publish(arg) => {
            let value = arg.resolve(env)?;
            match value.downcast_arc::<Future>() {
                Some(future) => Ok(cx.force(&future)),
                None => Ok(Outcome::Published(value)),
            }
        }

        Node::Parallel(a, b) => {
            cx.spawn(Closure::new(a.clone(), env.clone()), Vec::new());
            b.run(cx, env, &[])
        }

        Node::Sequence(a, b) => {
            let frame = Frame::new(Closure::new(b.clone(), env.clone()), cx.sink().clone());
            let left = cx.with_sink(Sink::Then(frame));
            match a.run(&left, env, &[])? {
                // Publication straight from the left side: continue on this stack.
                Outcome::Published(value) => b.run(cx, env, &[value]),
                outcome => Ok(outcome),
            }
        }

        Node::Prune(a, b) => {
            let future = Future::shared();
            let terminator = Terminator::child(cx.terminator());
            let counter = {
                let future = future.clone();
                let terminator = terminator.clone();
                Counter::nested(cx.counter(), move || {
                    let _ = future.stop();
                    terminator.detach();
                })
            };

            let bind = Arc::new(PruneBind {
                future: future.clone(),
                terminator: terminator.clone(),
            });
            let right = cx.with_scope(counter.clone(), terminator, Sink::Notify(bind));
            right.spawn(Closure::new(b.clone(), env.clone()), Vec::new());
            counter.halt_token();

            let future: Arc<dyn Any + Send + Sync> = future;
            a.run(cx, &env.bind(Value::Opaque(future)), &[])
        }

        Node::Otherwise(a, b) => {
            let published = Arc::new(AtomicBool::new(false));
            let counter = {
                let published = published.clone();
                let fallback = cx.clone();
                let b = Closure::new(b.clone(), env.clone());
                Counter::nested(cx.counter(), move || {
                    if !published.load(Ordering::Acquire) && fallback.terminator().is_live() {
                        fallback.resume(b, Vec::new());
                    }
                })
            };

            let mark = Arc::new(OtherwiseMark {
                published,
                outer: cx.clone(),
            });
            let left = cx.with_scope(counter, cx.terminator().clone(), Sink::Notify(mark));
            let outcome = a.run(&left, env, &[]);
            left.settle(outcome);
            Ok(Outcome::Halted)
        }

        Node::Call {
            call_site,
            target,
            args,
        } => {
            let target = target.resolve(env)?;
            let args = args
                .iter()
                .map(|arg| arg.resolve(env))
                .collect::<RuntimeResult<Vec<_>>>()?;
            cx.call(call_site, &target, &args)
        }

        Node::Lambda(code) => Ok(Outcome::Published(
            Closure::new(code.clone(), env.clone()).into_value(),
        )),
    }
}

/// Binds the pruning future to the right side's first publication and kills
/// the right side
struct PruneBind {
    future: Arc<Future>,
    terminator: Arc<Terminator>,
}

impl Receiver for PruneBind {
    fn receive(&self, _cx: &Context, value: Value) {
        if self.future.bind(value).is_ok() {
            tracing::trace!("pruned");
        }
        self.terminator.kill();
    }
}

/// Marks the left side of an otherwise as having published, and forwards
struct OtherwiseMark {
    published: Arc<AtomicBool>,
    outer: Context,
}

impl Receiver for OtherwiseMark {
    fn receive(&self, _cx: &Context, value: Value) {
        self.published.store(true, Ordering::Release);
        self.outer.deliver(value);
    }
}
