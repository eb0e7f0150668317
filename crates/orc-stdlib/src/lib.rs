//! Orc Standard Sites
//!
//! Sites every Orc program can call by name:
//! - **Arithmetic**: `Add`, `Sub`, `Mul`, `Div`, `Eq`, `Lt`, `Gt` (`arith`)
//! - **Logic**: `Ift`, `Iff`, `Let`, `Error` (`logic`)
//! - **Time**: `Rwait` (`time`)
//! - **Synchronization**: `Semaphore` (`semaphore`)
//!
//! Use [`stdlib`] for a shared registry of all of them, or
//! [`register_stdlib`] to add them to a host's own registry.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod arith;
pub mod logic;
pub mod registry;
pub mod semaphore;
pub mod time;

#[cfg(test)]
mod testing;

pub use registry::{register_stdlib, stdlib};
pub use semaphore::{Semaphore, SemaphoreError, SemaphoreFactory, SemaphoreId};
pub use time::Rwait;
