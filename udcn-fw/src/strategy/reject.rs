use udcn_common::NackReason;

use super::{SgCtx, Strategy};

/// Nack every Interest with NoRoute
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectStrategy;

impl Strategy for RejectStrategy {
    fn name(&self) -> &'static str {
        "reject"
    }

    fn on_interest(&self, ctx: &mut SgCtx<'_>) {
        ctx.return_nacks(NackReason::NoRoute);
    }
}
