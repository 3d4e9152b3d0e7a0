//! Forwarding strategies.
//!
//! A strategy is chosen per FIB entry and invoked by the forwarding core on
//! four events. It sees one `SgCtx` per invocation and acts only through
//! the context's three operations: forward the Interest to a nexthop, arm a
//! timer, or Nack every downstream.

mod delay;
mod fastroute;
mod multicast;
mod reject;
mod roundrobin;
mod sequential;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use udcn_common::{FaceId, NackReason, FACE_INVALID, FIB_SG_SCRATCH, PIT_SG_SCRATCH};
use udcn_core::Packet;

use crate::clock::Time;
use crate::face::FaceTx;
use crate::fib::FibEntry;
use crate::fwd::{nack_downstreams, send_upstream, FwFwdCounters};
use crate::pcct::Pcct;
use crate::pit::{PitEntry, PitHandle};

pub use delay::DelayStrategy;
pub use fastroute::FastRouteStrategy;
pub use multicast::MulticastStrategy;
pub use reject::RejectStrategy;
pub use roundrobin::RoundRobinStrategy;
pub use sequential::SequentialStrategy;

pub type StrategyId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SgEvent {
    Interest,
    Data,
    Nack,
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SgForwardResult {
    Ok,
    /// Nexthop face is down
    BadFace,
    /// No upstream record could be allocated, or the entry is gone
    AllocError,
    /// Retransmission to this upstream is suppressed
    Suppressed,
    /// Every downstream nonce was rejected by this upstream
    NoNonce,
    HopZero,
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_interest(&self, ctx: &mut SgCtx<'_>);

    fn on_data(&self, _ctx: &mut SgCtx<'_>) {}

    fn on_nack(&self, _ctx: &mut SgCtx<'_>) {}

    fn on_timer(&self, _ctx: &mut SgCtx<'_>) {}

    fn invoke(&self, ctx: &mut SgCtx<'_>) {
        match ctx.event() {
            SgEvent::Interest => self.on_interest(ctx),
            SgEvent::Data => self.on_data(ctx),
            SgEvent::Nack => self.on_nack(ctx),
            SgEvent::Timer => self.on_timer(ctx),
        }
    }
}

/// State a strategy invocation may read and the operations it may perform
pub struct SgCtx<'a> {
    event: SgEvent,
    now: Time,
    /// Bit `i` set: nexthop `i` of the FIB entry is excluded
    nh_flt: u32,
    /// Packet that triggered the event, `None` on timer events
    pkt: Option<&'a Packet>,
    fib_entry: &'a FibEntry,
    /// Per FIB entry scratch, kept across invocations until the entry changes
    fib_scratch: &'a mut [u8; FIB_SG_SCRATCH],
    pit: PitHandle,
    pcct: &'a mut Pcct,
    faces: &'a dyn FaceTx,
    core: u8,
    counters: &'a FwFwdCounters,
    /// Interests sent upstream during this invocation
    n_forwarded: u32,
    /// `return_nacks` was called during this invocation
    nacked: bool,
}

impl<'a> SgCtx<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        event: SgEvent,
        now: Time,
        pkt: Option<&'a Packet>,
        fib_entry: &'a FibEntry,
        fib_scratch: &'a mut [u8; FIB_SG_SCRATCH],
        pit: PitHandle,
        pcct: &'a mut Pcct,
        faces: &'a dyn FaceTx,
        core: u8,
        counters: &'a FwFwdCounters,
    ) -> Self {
        // never forward back to a live downstream
        let mut nh_flt = 0u32;
        if let Some(entry) = pcct.pit_entry(pit) {
            for (i, nh) in fib_entry.nexthops().iter().enumerate() {
                if entry.dns().iter().any(|dn| dn.face == *nh && dn.expiry >= now) {
                    nh_flt |= 1 << i;
                }
            }
        }
        Self {
            event,
            now,
            nh_flt,
            pkt,
            fib_entry,
            fib_scratch,
            pit,
            pcct,
            faces,
            core,
            counters,
            n_forwarded: 0,
            nacked: false,
        }
    }

    pub fn event(&self) -> SgEvent {
        self.event
    }

    pub fn now(&self) -> Time {
        self.now
    }

    /// Packet that triggered a Data or Nack event
    pub fn packet(&self) -> Option<&'a Packet> {
        self.pkt
    }

    /// Face the triggering packet arrived on
    pub fn rx_face(&self) -> FaceId {
        self.pkt.map_or(FACE_INVALID, |p| p.rx_face)
    }

    pub fn fib_entry(&self) -> &'a FibEntry {
        self.fib_entry
    }

    pub fn pit_entry(&self) -> Option<&PitEntry> {
        self.pcct.pit_entry(self.pit)
    }

    /// Nexthops not excluded by the filter, in FIB order
    pub fn nexthops(&self) -> impl Iterator<Item = (usize, FaceId)> + 'a {
        let flt = self.nh_flt;
        let entry: &'a FibEntry = self.fib_entry;
        entry
            .nexthops()
            .iter()
            .copied()
            .enumerate()
            .filter(move |(i, _)| flt & (1 << i) == 0)
    }

    pub fn exclude(&mut self, index: usize) {
        if index < 32 {
            self.nh_flt |= 1 << index;
        }
    }

    pub fn n_forwarded(&self) -> u32 {
        self.n_forwarded
    }

    pub fn is_nacked(&self) -> bool {
        self.nacked
    }

    pub fn fib_scratch(&mut self) -> &mut [u8; FIB_SG_SCRATCH] {
        &mut *self.fib_scratch
    }

    /// Scratch area of the PIT entry, zeroed on first use by this strategy
    pub fn pit_scratch(&mut self) -> Option<&mut [u8; PIT_SG_SCRATCH]> {
        let strategy = self.fib_entry.strategy();
        self.pcct
            .pit_entry_mut(self.pit)
            .map(|entry| entry.sg_scratch_for(strategy))
    }

    /// Send the PIT entry's Interest to `nh`
    pub fn forward_interest(&mut self, nh: FaceId) -> SgForwardResult {
        if self.faces.is_down(nh) {
            return SgForwardResult::BadFace;
        }
        if self.nacked {
            return SgForwardResult::AllocError;
        }
        let Some(up) = self.pcct.pit().reserve_up(self.pit, nh) else {
            return SgForwardResult::AllocError;
        };
        let Some(entry) = self.pcct.pit_entry(self.pit) else {
            return SgForwardResult::AllocError;
        };
        if entry.ups()[up].should_suppress(self.now) {
            return SgForwardResult::Suppressed;
        }
        let Some(nonce) = entry.choose_nonce(up, self.now) else {
            return SgForwardResult::NoNonce;
        };
        let result = send_upstream(
            self.pcct,
            self.pit,
            up,
            nh,
            nonce,
            self.now,
            self.core,
            self.faces,
            self.counters,
        );
        if result != SgForwardResult::Ok {
            return result;
        }
        self.n_forwarded += 1;
        SgForwardResult::Ok
    }

    /// Invoke the strategy again with a Timer event after `after`. Fails if
    /// the PIT entry would expire first.
    pub fn set_timer(&mut self, after: Duration) -> bool {
        !self.nacked && self.pcct.pit().set_sg_timer(self.pit, self.now, after)
    }

    /// Nack every live downstream and erase the PIT entry. Only allowed on
    /// an Interest event.
    pub fn return_nacks(&mut self, reason: NackReason) -> bool {
        if self.event != SgEvent::Interest || self.nacked {
            return false;
        }
        nack_downstreams(self.pcct, self.pit, reason, self.now, self.faces, self.counters);
        self.nacked = true;
        true
    }
}

/// Little-endian u32 at `at` in a scratch area
pub(crate) fn scratch_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn set_scratch_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// Strategies by id, with a lookup by name
pub struct StrategyTable {
    strategies: Vec<Arc<dyn Strategy>>,
    by_name: HashMap<&'static str, StrategyId>,
    default: StrategyId,
}

impl StrategyTable {
    /// Empty table; the first registered strategy becomes the default
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
            by_name: HashMap::new(),
            default: 0,
        }
    }

    /// Table of the built-in strategies with `multicast` as default
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.register(Arc::new(MulticastStrategy));
        table.register(Arc::new(SequentialStrategy));
        table.register(Arc::new(RoundRobinStrategy));
        table.register(Arc::new(FastRouteStrategy));
        table.register(Arc::new(RejectStrategy));
        table.register(Arc::new(DelayStrategy::default()));
        table
    }

    /// Add a strategy, replacing one of the same name
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) -> StrategyId {
        let name = strategy.name();
        if let Some(&id) = self.by_name.get(name) {
            self.strategies[id as usize] = strategy;
            return id;
        }
        assert!(self.strategies.len() <= StrategyId::MAX as usize, "strategy table is full");
        let id = self.strategies.len() as StrategyId;
        self.strategies.push(strategy);
        self.by_name.insert(name, id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<StrategyId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: StrategyId) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(id as usize)
    }

    pub fn set_default(&mut self, name: &str) -> bool {
        match self.id_of(name) {
            Some(id) => {
                self.default = id;
                true
            }
            None => false,
        }
    }

    pub fn default_id(&self) -> StrategyId {
        self.default
    }

    /// Strategy `id`, or the default one when `id` is unknown
    pub fn resolve(&self, id: StrategyId) -> Option<&Arc<dyn Strategy>> {
        self.get(id).or_else(|| self.get(self.default))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let mut table = StrategyTable::new();
        assert_eq!(table.len(), 6);
        for name in ["multicast", "sequential", "roundrobin", "fastroute", "reject", "delay"] {
            let id = table.id_of(name).unwrap();
            assert_eq!(table.get(id).unwrap().name(), name);
        }
        assert_eq!(table.resolve(200).unwrap().name(), "multicast");

        assert!(table.set_default("reject"));
        assert!(!table.set_default("missing"));
        assert_eq!(table.resolve(200).unwrap().name(), "reject");

        let id = table.register(Arc::new(MulticastStrategy));
        assert_eq!(id, 0);
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn test_scratch_helpers() {
        let mut buf = [0u8; 8];
        set_scratch_u32(&mut buf, 4, 0xdead_beef);
        assert_eq!(scratch_u32(&buf, 4), 0xdead_beef);
        assert_eq!(scratch_u32(&buf, 0), 0);
    }
}
