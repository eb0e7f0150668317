//! Combinator programs
//!
//! A small closed set of expression kinds, compiled onto the closure
//! contract of the runtime. Variables are de Bruijn indices into the
//! lexical environment.
//!
//! | Expression | Orc | Binds |
//! |------------|-----|-------|
//! | `Parallel(a, b)` | `a \| b` | |
//! | `Sequence(a, b)` | `a >x> b` | `x` in `b`, once per publication of `a` |
//! | `Prune(a, b)` | `a <x< b` | `x` in `a`, a future of the first publication of `b` |
//! | `Otherwise(a, b)` | `a ; b` | |

mod eval;
mod expr;

pub use expr::{Arg, Expr};
