//! Synchronization primitives of the execution core
//!
//! Each primitive guards exactly its own state transition with one lock or
//! atomic, and never runs foreign code while holding it.

mod counter;
mod future;
mod join;
mod terminator;

pub use counter::{invariant_violated, Counter, ZeroAction};
pub use future::{Future, FutureError, FutureReader, Resolution};
pub use join::{Join, JoinContinuation};
pub use terminator::{ChildKey, Killable, Terminator};
