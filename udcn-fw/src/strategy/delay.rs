use std::time::Duration;

use super::{SgCtx, Strategy};

/// Hold each Interest for a fixed delay, then multicast it
#[derive(Debug, Clone, Copy)]
pub struct DelayStrategy {
    delay: Duration,
}

impl DelayStrategy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    fn multicast(ctx: &mut SgCtx<'_>) {
        for (_, nh) in ctx.nexthops() {
            ctx.forward_interest(nh);
        }
    }
}

impl Default for DelayStrategy {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

impl Strategy for DelayStrategy {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn on_interest(&self, ctx: &mut SgCtx<'_>) {
        // the entry expires before the delay is over
        if !ctx.set_timer(self.delay) {
            Self::multicast(ctx);
        }
    }

    fn on_timer(&self, ctx: &mut SgCtx<'_>) {
        Self::multicast(ctx);
    }
}
