//! Orc SDK - Lightweight SDK for writing sites
//!
//! This crate provides the minimal types and traits needed to implement Orc
//! sites without depending on the full orc-engine:
//! - [`Value`]: the values exchanged between programs and sites
//! - [`Site`] / [`DirectSite`]: the operations a site library exports
//! - [`Invoker`] / [`DirectInvoker`]: the resolved call paths the engine caches
//! - [`CallContext`]: the completion handle of an asynchronous call
//!
//! # Example
//!
//! ```ignore
//! use orc_sdk::{Args, CallHandle, DirectSite, Site, SiteResult, Value};
//!
//! struct Double;
//!
//! impl Site for Double {
//!     fn name(&self) -> &str { "Double" }
//!     fn call(&self, ctx: CallHandle, args: &[Value]) {
//!         let _ = match self.call_direct(args) {
//!             Ok(v) => ctx.publish(v),
//!             Err(e) => ctx.fail(e),
//!         };
//!     }
//!     fn as_direct(&self) -> Option<&dyn DirectSite> { Some(self) }
//! }
//!
//! impl DirectSite for Double {
//!     fn call_direct(&self, args: &[Value]) -> SiteResult<Value> {
//!         let args = Args::new("Double", args).exactly(1)?;
//!         Ok(Value::Int(args.int(0)? * 2))
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod context;
pub mod convert;
pub mod error;
pub mod handler;
pub mod value;

pub use context::{CallContext, CallHandle, CallSiteId, TimerCallback, TimerKey, TimerService};
pub use convert::Args;
pub use error::{CallError, SiteError, SiteResult};
pub use handler::{DirectInvoker, DirectSite, Invoker, Site, SiteRegistry};
pub use value::{SiteRef, Value};
