use super::{SgCtx, SgForwardResult, Strategy};

/// Forward to the first nexthop, in FIB order, that accepts the Interest
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialStrategy;

impl Strategy for SequentialStrategy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn on_interest(&self, ctx: &mut SgCtx<'_>) {
        for (_, nh) in ctx.nexthops() {
            if ctx.forward_interest(nh) == SgForwardResult::Ok {
                break;
            }
        }
    }
}
