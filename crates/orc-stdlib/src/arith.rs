//! Arithmetic and comparison sites
//!
//! All of these answer synchronously. Integer operands stay integers;
//! mixing in a float widens both sides.

use orc_sdk::{Args, CallHandle, DirectSite, Site, SiteError, SiteResult, Value};

enum Operands {
    Int(i64, i64),
    Float(f64, f64),
}

fn operands(site: &str, values: &[Value]) -> SiteResult<Operands> {
    let args = Args::new(site, values).exactly(2)?;
    match (args.get(0)?, args.get(1)?) {
        (Value::Int(a), Value::Int(b)) => Ok(Operands::Int(*a, *b)),
        _ => Ok(Operands::Float(args.float(0)?, args.float(1)?)),
    }
}

fn overflow(site: &str) -> SiteError {
    SiteError::failed(format!("{}: integer overflow", site))
}

macro_rules! direct_site {
    ($(#[$meta:meta])* $name:ident, $label:literal, |$args:ident| $body:expr) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        impl Site for $name {
            fn name(&self) -> &str {
                $label
            }

            fn call(&self, ctx: CallHandle, args: &[Value]) {
                let _ = match self.call_direct(args) {
                    Ok(value) => ctx.publish(value),
                    Err(error) => ctx.fail(error),
                };
            }

            fn as_direct(&self) -> Option<&dyn DirectSite> {
                Some(self)
            }
        }

        impl DirectSite for $name {
            fn call_direct(&self, $args: &[Value]) -> SiteResult<Value> {
                $body
            }
        }
    };
}

direct_site!(
    /// `a + b`
    Add, "Add", |args| match operands("Add", args)? {
        Operands::Int(a, b) => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow("Add")),
        Operands::Float(a, b) => Ok(Value::Float(a + b)),
    }
);

direct_site!(
    /// `a - b`
    Sub, "Sub", |args| match operands("Sub", args)? {
        Operands::Int(a, b) => a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow("Sub")),
        Operands::Float(a, b) => Ok(Value::Float(a - b)),
    }
);

direct_site!(
    /// `a * b`
    Mul, "Mul", |args| match operands("Mul", args)? {
        Operands::Int(a, b) => a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow("Mul")),
        Operands::Float(a, b) => Ok(Value::Float(a * b)),
    }
);

direct_site!(
    /// `a / b`; integer division truncates
    Div, "Div", |args| match operands("Div", args)? {
        Operands::Int(_, 0) => Err(SiteError::failed("Div: division by zero")),
        Operands::Int(a, b) => a.checked_div(b).map(Value::Int).ok_or_else(|| overflow("Div")),
        Operands::Float(a, b) => Ok(Value::Float(a / b)),
    }
);

direct_site!(
    /// Structural equality of any two values
    Equal, "Eq", |args| {
        let args = Args::new("Eq", args).exactly(2)?;
        Ok(Value::Bool(args.get(0)? == args.get(1)?))
    }
);

direct_site!(
    /// `a < b`
    Less, "Lt", |args| Ok(Value::Bool(match operands("Lt", args)? {
        Operands::Int(a, b) => a < b,
        Operands::Float(a, b) => a < b,
    }))
);

direct_site!(
    /// `a > b`
    Greater, "Gt", |args| Ok(Value::Bool(match operands("Gt", args)? {
        Operands::Int(a, b) => a > b,
        Operands::Float(a, b) => a > b,
    }))
);
