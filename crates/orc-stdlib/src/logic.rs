//! Conditional and utility sites

use orc_sdk::{Args, CallHandle, DirectSite, Site, SiteError, SiteResult, Value};

/// Publishes a signal if its argument is true, halts otherwise.
///
/// Halting silently is not expressible as a direct result, so this site is
/// always called through its handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ift;

/// Publishes a signal if its argument is false, halts otherwise
#[derive(Debug, Default, Clone, Copy)]
pub struct Iff;

fn condition(site: &str, args: &[Value]) -> SiteResult<bool> {
    Args::new(site, args).exactly(1)?.bool(0)
}

fn branch(ctx: CallHandle, result: SiteResult<bool>, when: bool) {
    let _ = match result {
        Ok(value) if value == when => ctx.publish(Value::Signal),
        Ok(_) => ctx.halt(),
        Err(error) => ctx.fail(error),
    };
}

impl Site for Ift {
    fn name(&self) -> &str {
        "Ift"
    }

    fn call(&self, ctx: CallHandle, args: &[Value]) {
        branch(ctx, condition("Ift", args), true);
    }
}

impl Site for Iff {
    fn name(&self) -> &str {
        "Iff"
    }

    fn call(&self, ctx: CallHandle, args: &[Value]) {
        branch(ctx, condition("Iff", args), false);
    }
}

/// Publishes its arguments: nothing gives a signal, one argument is
/// published as is, more are published as a tuple
#[derive(Debug, Default, Clone, Copy)]
pub struct Let;

impl Site for Let {
    fn name(&self) -> &str {
        "Let"
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

impl DirectSite for Let {
    fn call_direct(&self, args: &[Value]) -> SiteResult<Value> {
        Ok(match args {
            [] => Value::Signal,
            [value] => value.clone(),
            values => Value::tuple(values.to_vec()),
        })
    }
}

/// Fails with the given message
#[derive(Debug, Default, Clone, Copy)]
pub struct Error;

impl Site for Error {
    fn name(&self) -> &str {
        "Error"
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

impl DirectSite for Error {
    fn call_direct(&self, args: &[Value]) -> SiteResult<Value> {
        let args = Args::new("Error", args).exactly(1)?;
        Err(SiteError::failed(args.str(0)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Completion, RecordingCall};

    #[test]
    fn test_ift_and_iff() {
        let call = RecordingCall::new();
        Ift.call(call.handle(), &[Value::Bool(true)]);
        assert_eq!(call.completion(), Some(Completion::Published(Value::Signal)));

        let call = RecordingCall::new();
        Ift.call(call.handle(), &[Value::Bool(false)]);
        assert_eq!(call.completion(), Some(Completion::Halted));

        let call = RecordingCall::new();
        Iff.call(call.handle(), &[Value::Bool(false)]);
        assert_eq!(call.completion(), Some(Completion::Published(Value::Signal)));
    }

    #[test]
    fn test_ift_rejects_non_boolean() {
        let call = RecordingCall::new();
        Ift.call(call.handle(), &[Value::Int(1)]);
        assert!(matches!(
            call.completion(),
            Some(Completion::Failed(SiteError::TypeMismatch { index: 0, .. }))
        ));
        assert!(Ift.as_direct().is_none());
    }

    #[test]
    fn test_let_shapes() {
        assert_eq!(Let.call_direct(&[]), Ok(Value::Signal));
        assert_eq!(Let.call_direct(&[Value::Int(1)]), Ok(Value::Int(1)));
        assert_eq!(
            Let.call_direct(&[Value::Int(1), Value::str("a")]),
            Ok(Value::tuple(vec![Value::Int(1), Value::str("a")]))
        );
    }

    #[test]
    fn test_error_fails_with_message() {
        assert_eq!(
            Error.call_direct(&[Value::str("nope")]),
            Err(SiteError::Failed("nope".into()))
        );
    }
}
