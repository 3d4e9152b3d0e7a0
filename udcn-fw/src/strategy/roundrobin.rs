use super::{scratch_u32, set_scratch_u32, SgCtx, SgForwardResult, Strategy};

/// FIB scratch offset of the next nexthop index to try
const CURSOR: usize = 0;

/// Spread Interests over the nexthops of a FIB entry, one nexthop per Interest
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinStrategy;

impl Strategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn on_interest(&self, ctx: &mut SgCtx<'_>) {
        let n = ctx.fib_entry().nexthops().len();
        if n == 0 {
            return;
        }
        let cursor = scratch_u32(ctx.fib_scratch(), CURSOR) as usize % n;
        for k in 0..n {
            let index = (cursor + k) % n;
            let Some((_, nh)) = ctx.nexthops().find(|(i, _)| *i == index) else {
                continue;
            };
            if ctx.forward_interest(nh) == SgForwardResult::Ok {
                set_scratch_u32(ctx.fib_scratch(), CURSOR, ((index + 1) % n) as u32);
                return;
            }
        }
    }
}
