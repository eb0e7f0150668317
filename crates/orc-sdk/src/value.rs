//! Orc runtime values
//!
//! `Value` is what flows between sites, closures and futures. Primitive values
//! are stored inline; aggregates are reference-counted so cloning a value is
//! always cheap. Engine-private objects (closures, futures) travel as
//! `Value::Opaque` and are recovered with [`Value::downcast_ref`].

use crate::handler::Site;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a site implementation
pub type SiteRef = Arc<dyn Site>;

/// A runtime value
#[derive(Clone)]
pub enum Value {
    /// The unit value published by sites that only signal completion
    Signal,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Immutable tuple
    Tuple(Arc<[Value]>),
    /// A callable site
    Site(SiteRef),
    /// Engine-private object (closure, future, ...)
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Create a string value
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Create a tuple value
    pub fn tuple(items: impl Into<Vec<Value>>) -> Self {
        Value::Tuple(Arc::from(items.into()))
    }

    /// Wrap a site as a value
    pub fn site(site: impl Site) -> Self {
        Value::Site(Arc::new(site))
    }

    /// Wrap an engine-private object
    pub fn opaque<T: Any + Send + Sync>(object: T) -> Self {
        Value::Opaque(Arc::new(object))
    }

    /// Borrow the engine-private object if it has type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(object) => object.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Shared handle to the engine-private object if it has type `T`
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Value::Opaque(object) => Arc::clone(object).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get tuple elements
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Get the site if this value is callable as a site
    pub fn as_site(&self) -> Option<&SiteRef> {
        match self {
            Value::Site(site) => Some(site),
            _ => None,
        }
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Signal => "signal",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Tuple(_) => "tuple",
            Value::Site(_) => "site",
            Value::Opaque(_) => "object",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Signal, Value::Signal) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Site(a), Value::Site(b)) => Arc::ptr_eq(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Signal => write!(f, "signal"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Tuple(items) => f.debug_tuple("").field(items).finish(),
            Value::Site(site) => write!(f, "<site {}>", site.name()),
            Value::Opaque(_) => write!(f, "<object>"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            other => write!(f, "{:?}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}
