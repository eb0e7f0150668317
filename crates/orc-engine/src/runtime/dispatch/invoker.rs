//! Invokers for site targets
//!
//! Both invokers are keyed by the site's implementation type, so a cached
//! invoker serves every instance of the same site type.

use orc_sdk::{CallHandle, DirectInvoker, Invoker, SiteError, SiteResult, Value};
use std::any::TypeId;

fn same_type(target: &Value, site_type: TypeId) -> bool {
    target
        .as_site()
        .map_or(false, |site| site.site_type() == site_type)
}

/// Invokes sites through their asynchronous entry point
#[derive(Debug)]
pub struct SiteInvoker {
    site_type: TypeId,
}

impl SiteInvoker {
    /// Invoker for sites of `site_type`
    pub fn new(site_type: TypeId) -> Self {
        Self { site_type }
    }
}

impl Invoker for SiteInvoker {
    fn can_invoke(&self, target: &Value, _args: &[Value]) -> bool {
        same_type(target, self.site_type)
    }

    fn invoke(&self, ctx: CallHandle, target: &Value, args: &[Value]) {
        match target.as_site() {
            Some(site) => site.call(ctx, args),
            None => {
                let _ = ctx.fail(SiteError::Uncallable(target.type_name()));
            }
        }
    }
}

/// Invokes sites that answer synchronously
#[derive(Debug)]
pub struct DirectSiteInvoker {
    site_type: TypeId,
}

impl DirectSiteInvoker {
    /// Invoker for direct sites of `site_type`
    pub fn new(site_type: TypeId) -> Self {
        Self { site_type }
    }
}

impl Invoker for DirectSiteInvoker {
    fn can_invoke(&self, target: &Value, _args: &[Value]) -> bool {
        same_type(target, self.site_type)
    }

    fn invoke(&self, ctx: CallHandle, target: &Value, args: &[Value]) {
        let _ = match self.invoke_direct(target, args) {
            Ok(value) => ctx.publish(value),
            Err(error) => ctx.fail(error),
        };
    }

    fn as_direct(&self) -> Option<&dyn DirectInvoker> {
        Some(self)
    }
}

impl DirectInvoker for DirectSiteInvoker {
    fn invoke_direct(&self, target: &Value, args: &[Value]) -> SiteResult<Value> {
        let direct = target
            .as_site()
            .and_then(|site| site.as_direct())
            .ok_or(SiteError::Uncallable(target.type_name()))?;
        direct.call_direct(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_sdk::{Args, DirectSite, Site};

    struct Double;

    impl Site for Double {
        fn name(&self) -> &str {
            "Double"
        }
        fn call(&self, ctx: CallHandle, args: &[Value]) {
            let _ = match self.call_direct(args) {
                Ok(v) => ctx.publish(v),
                Err(e) => ctx.fail(e),
            };
        }
        fn as_direct(&self) -> Option<&dyn DirectSite> {
            Some(self)
        }
    }

    impl DirectSite for Double {
        fn call_direct(&self, args: &[Value]) -> SiteResult<Value> {
            let args = Args::new("Double", args).exactly(1)?;
            Ok(Value::Int(args.int(0)? * 2))
        }
    }

    #[test]
    fn test_direct_invoker() {
        let target = Value::site(Double);
        let invoker = DirectSiteInvoker::new(TypeId::of::<Double>());

        assert!(invoker.can_invoke(&target, &[]));
        assert!(!invoker.can_invoke(&Value::Int(1), &[]));

        let direct = invoker.as_direct().unwrap();
        assert_eq!(direct.invoke_direct(&target, &[Value::Int(21)]), Ok(Value::Int(42)));
        assert!(direct.invoke_direct(&target, &[]).is_err());
    }

    #[test]
    fn test_site_invoker_type_check() {
        let invoker = SiteInvoker::new(TypeId::of::<Double>());
        assert!(invoker.can_invoke(&Value::site(Double), &[]));
        assert!(invoker.as_direct().is_none());
    }
}
