use super::{SgCtx, Strategy};

/// Forward every Interest to all eligible nexthops
#[derive(Debug, Default, Clone, Copy)]
pub struct MulticastStrategy;

impl Strategy for MulticastStrategy {
    fn name(&self) -> &'static str {
        "multicast"
    }

    fn on_interest(&self, ctx: &mut SgCtx<'_>) {
        for (_, nh) in ctx.nexthops() {
            ctx.forward_interest(nh);
        }
    }
}
