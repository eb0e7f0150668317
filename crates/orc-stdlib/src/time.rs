//! Timed sites

use orc_sdk::{Args, CallHandle, Site, SiteError, SiteResult, Value};
use std::time::Duration;

/// `Rwait(ms)`: publishes a signal after `ms` milliseconds of real time.
///
/// Killing the caller cancels the timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rwait;

fn delay(args: &[Value]) -> SiteResult<Duration> {
    let ms = Args::new("Rwait", args).exactly(1)?.int(0)?;
    u64::try_from(ms)
        .map(Duration::from_millis)
        .map_err(|_| SiteError::failed(format!("Rwait: negative delay {}", ms)))
}

impl Site for Rwait {
    fn name(&self) -> &str {
        "Rwait"
    }

    fn call(&self, ctx: CallHandle, args: &[Value]) {
        let delay = match delay(args) {
            Ok(delay) => delay,
            Err(error) => {
                let _ = ctx.fail(error);
                return;
            }
        };

        let timer = ctx.timer();
        let key = {
            let ctx = ctx.clone();
            timer.schedule(
                delay,
                Box::new(move || {
                    let _ = ctx.publish(Value::Signal);
                }),
            )
        };
        ctx.on_cancel(Box::new(move || {
            timer.cancel(key);
        }));
    }
}
