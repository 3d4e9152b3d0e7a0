use udcn_common::FaceId;

use super::{scratch_u32, set_scratch_u32, SgCtx, SgForwardResult, Strategy};

/// FIB scratch offset of the nexthop index that answered last
const BEST: usize = 0;

/// PIT scratch offset of the bitmask of nexthops already tried
const TRIED: usize = 0;

/// Send each Interest to the nexthop that answered most recently. A Nack
/// from that nexthop moves on to the next one and retries there.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastRouteStrategy;

impl FastRouteStrategy {
    fn nexthop_index(ctx: &SgCtx<'_>) -> Option<usize> {
        let rx_face = ctx.rx_face();
        ctx.fib_entry().nexthops().iter().position(|nh| *nh == rx_face)
    }

    /// Forward to the first untried nexthop in `order`
    fn forward_first(ctx: &mut SgCtx<'_>, order: impl Iterator<Item = (usize, FaceId)>) {
        let tried = ctx.pit_scratch().map_or(0, |s| scratch_u32(&s[..], TRIED));
        for (index, nh) in order {
            if tried & (1 << index) != 0 {
                continue;
            }
            if ctx.forward_interest(nh) == SgForwardResult::Ok {
                if let Some(s) = ctx.pit_scratch() {
                    set_scratch_u32(&mut s[..], TRIED, tried | (1 << index));
                }
                return;
            }
        }
    }
}

impl Strategy for FastRouteStrategy {
    fn name(&self) -> &'static str {
        "fastroute"
    }

    fn on_interest(&self, ctx: &mut SgCtx<'_>) {
        let best = scratch_u32(ctx.fib_scratch(), BEST) as usize;
        let first = ctx.nexthops().find(|(i, _)| *i == best);
        let rest = ctx.nexthops().filter(move |(i, _)| *i != best);
        // a retransmitted Interest may go to a nexthop tried before
        if let Some(s) = ctx.pit_scratch() {
            set_scratch_u32(&mut s[..], TRIED, 0);
        }
        Self::forward_first(ctx, first.into_iter().chain(rest));
    }

    fn on_data(&self, ctx: &mut SgCtx<'_>) {
        if let Some(index) = Self::nexthop_index(ctx) {
            set_scratch_u32(ctx.fib_scratch(), BEST, index as u32);
        }
    }

    fn on_nack(&self, ctx: &mut SgCtx<'_>) {
        let n = ctx.fib_entry().nexthops().len();
        let Some(index) = Self::nexthop_index(ctx) else {
            return;
        };
        let best = scratch_u32(ctx.fib_scratch(), BEST) as usize;
        if best == index && n > 0 {
            set_scratch_u32(ctx.fib_scratch(), BEST, ((index + 1) % n) as u32);
        }
        if let Some(s) = ctx.pit_scratch() {
            let tried = scratch_u32(&s[..], TRIED);
            set_scratch_u32(&mut s[..], TRIED, tried | (1 << index));
        }
        ctx.exclude(index);
        let order = ctx.nexthops();
        Self::forward_first(ctx, order);
    }
}
