//! Argument extraction helpers for site implementations.
//!
//! Sites receive their arguments as a `&[Value]` slice. These helpers check
//! arity and types and produce the matching [`SiteError`] so that site bodies
//! can use `?` throughout.
//!
//! # Example
//!
//! ```ignore
//! fn call_direct(&self, args: &[Value]) -> SiteResult<Value> {
//!     let args = Args::new("Add", args).exactly(2)?;
//!     Ok(Value::Int(args.int(0)? + args.int(1)?))
//! }
//! ```

use crate::error::{SiteError, SiteResult};
use crate::value::Value;

/// Checked view over a site's arguments
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    site: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    /// Wrap the arguments of `site`
    pub fn new(site: &'a str, values: &'a [Value]) -> Self {
        Self { site, values }
    }

    /// Require exactly `n` arguments
    pub fn exactly(self, n: usize) -> SiteResult<Self> {
        if self.values.len() == n {
            Ok(self)
        } else {
            Err(SiteError::ArityMismatch {
                site: self.site.to_string(),
                expected: n,
                got: self.values.len(),
            })
        }
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw argument at `index`
    pub fn get(&self, index: usize) -> SiteResult<&'a Value> {
        self.values.get(index).ok_or_else(|| SiteError::ArityMismatch {
            site: self.site.to_string(),
            expected: index + 1,
            got: self.values.len(),
        })
    }

    /// Integer argument at `index`
    pub fn int(&self, index: usize) -> SiteResult<i64> {
        let v = self.get(index)?;
        v.as_int().ok_or_else(|| self.mismatch(index, "integer", v))
    }

    /// Numeric argument at `index`, widening integers
    pub fn float(&self, index: usize) -> SiteResult<f64> {
        let v = self.get(index)?;
        v.as_float().ok_or_else(|| self.mismatch(index, "number", v))
    }

    /// Boolean argument at `index`
    pub fn bool(&self, index: usize) -> SiteResult<bool> {
        let v = self.get(index)?;
        v.as_bool().ok_or_else(|| self.mismatch(index, "boolean", v))
    }

    /// String argument at `index`
    pub fn str(&self, index: usize) -> SiteResult<&'a str> {
        let v = self.get(index)?;
        v.as_str().ok_or_else(|| self.mismatch(index, "string", v))
    }

    fn mismatch(&self, index: usize, expected: &'static str, got: &Value) -> SiteError {
        SiteError::TypeMismatch {
            site: self.site.to_string(),
            index,
            expected,
            got: got.type_name(),
        }
    }
}
