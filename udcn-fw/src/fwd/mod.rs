//! Per-core forwarding pipeline.
//!
//! A `FwFwd` owns one PCCT shard and processes the packets dispatched to its
//! input ring. Everything on this path is single-threaded and never blocks;
//! the FIB, faces and strategies are shared read-only.

pub mod counters;
mod data;
mod interest;
mod nack;


use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use log::{debug, info};
use udcn_common::{FaceId, NackReason, PacketType, FACE_INVALID, FIB_SG_SCRATCH};
use udcn_core::{Data, Interest, LpHeader, Nack, Packet};

use crate::clock::{Clock, Time};
use crate::config::FwConfig;
use crate::crypto::{DigestCompletion, DigestHelper};
use crate::disk::{DiskCompletion, DiskStore};
use crate::face::FaceTx;
use crate::fib::{Fib, FibEntry, FibTable};
use crate::pcct::Pcct;
use crate::pit::{PitEntry, PitHandle};
use crate::strategy::{SgCtx, SgEvent, StrategyId, StrategyTable};

pub use counters::{ArcStats, FwFwdCounters, FwFwdCountersSnapshot, FwFwdStats, TableStats};
pub(crate) use interest::send_upstream;
pub(crate) use nack::nack_downstreams;

use counters::inc;

/// Collaborators shared by every forwarding core
#[derive(Clone)]
pub struct FwDeps {
    pub fib: Arc<Fib>,
    pub faces: Arc<dyn FaceTx>,
    pub strategies: Arc<StrategyTable>,
    pub clock: Arc<dyn Clock>,
}

impl FwDeps {
    pub fn new(fib: Arc<Fib>, faces: Arc<dyn FaceTx>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fib,
            faces,
            strategies: Arc::new(StrategyTable::new()),
            clock,
        }
    }

    pub fn with_strategies(mut self, strategies: StrategyTable) -> Self {
        self.strategies = Arc::new(strategies);
        self
    }
}

/// Per-core state of a FIB entry: the strategy's scratch area
struct FibDyn {
    strategy: StrategyId,
    seq_num: u32,
    scratch: [u8; FIB_SG_SCRATCH],
}

impl FibDyn {
    fn new(entry: &FibEntry) -> Self {
        Self {
            strategy: entry.strategy(),
            seq_num: entry.seq_num(),
            scratch: [0; FIB_SG_SCRATCH],
        }
    }
}

/// Scratch area of `entry`, cleared when the entry was replaced or changed strategy
fn fib_scratch<'m>(map: &'m mut HashMap<Vec<u8>, FibDyn>, entry: &FibEntry) -> &'m mut [u8; FIB_SG_SCRATCH] {
    let key = entry.name().value();
    if !map.contains_key(key) {
        map.insert(key.to_vec(), FibDyn::new(entry));
    }
    let Some(fd) = map.get_mut(key) else {
        unreachable!("FIB scratch for {} vanished", entry.name());
    };
    if fd.strategy != entry.strategy() || fd.seq_num != entry.seq_num() {
        *fd = FibDyn::new(entry);
    }
    &mut fd.scratch
}

/// FIB entry a PIT entry was forwarded by, or its current longest match if
/// that entry has been replaced
fn fib_for_pit(table: &FibTable, entry: &PitEntry) -> Option<Arc<FibEntry>> {
    let interest = entry.interest();
    entry
        .fib_ref()
        .and_then(|r| table.resolve(r, interest))
        .or_else(|| table.lpm(interest.active_fwhint().unwrap_or(&interest.name)))
        .cloned()
}

/// One forwarding core: owns a PCCT shard and processes the packets
/// dispatched to its input ring
pub struct FwFwd {
    /// Core id, carried in the high bits of the PIT tokens this core mints
    id: u8,
    pcct: Pcct,
    fib: Arc<Fib>,
    /// Strategy scratch per FIB entry, keyed by the entry's name
    fib_dyn: HashMap<Vec<u8>, FibDyn>,
    /// FIB sequence number `fib_dyn` was last pruned against
    fib_seen: u32,
    faces: Arc<dyn FaceTx>,
    strategies: Arc<StrategyTable>,
    /// Strategy for FIB entries whose own strategy is not registered
    default_sg: StrategyId,
    clock: Arc<dyn Clock>,
    /// Computes implicit digests off the forwarding thread
    digest: Option<Box<dyn DigestHelper>>,
    stats: Arc<FwFwdStats>,
    input: Arc<ArrayQueue<Packet>>,
    /// Input packets processed per `run_once`
    burst_size: usize,
    sg_fired: Vec<PitHandle>,
    disk_done: Vec<DiskCompletion>,
    digest_done: Vec<DigestCompletion>,
}

impl FwFwd {
    pub fn new(id: u8, config: &FwConfig, deps: &FwDeps) -> Self {
        let default_sg = deps
            .strategies
            .id_of(&config.fwd.default_strategy)
            .unwrap_or_else(|| deps.strategies.default_id());
        debug!(
            "Forwarding core {} burst={} input ring={} default strategy={}",
            id, config.fwd.burst_size, config.fwd.input_ring_capacity, default_sg
        );
        Self {
            id,
            pcct: Pcct::new(config, deps.clock.now()),
            fib: Arc::clone(&deps.fib),
            fib_dyn: HashMap::new(),
            fib_seen: deps.fib.seq_num(),
            faces: Arc::clone(&deps.faces),
            strategies: Arc::clone(&deps.strategies),
            default_sg,
            clock: Arc::clone(&deps.clock),
            digest: None,
            stats: Arc::new(FwFwdStats::default()),
            input: Arc::new(ArrayQueue::new(config.fwd.input_ring_capacity.max(1))),
            burst_size: config.fwd.burst_size.max(1),
            sg_fired: Vec::new(),
            disk_done: Vec::new(),
            digest_done: Vec::new(),
        }
    }

    pub fn attach_disk(&mut self, store: Box<dyn DiskStore>, n_slots: u64) {
        info!("Forwarding core {} CS disk tier: {} slots", self.id, n_slots);
        self.pcct.attach_disk(store, n_slots);
    }

    pub fn set_digest_helper(&mut self, helper: Box<dyn DigestHelper>) {
        self.digest = Some(helper);
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn pcct(&self) -> &Pcct {
        &self.pcct
    }

    pub fn pcct_mut(&mut self) -> &mut Pcct {
        &mut self.pcct
    }

    pub fn stats(&self) -> Arc<FwFwdStats> {
        Arc::clone(&self.stats)
    }

    pub fn counters(&self) -> &FwFwdCounters {
        &self.stats.counters
    }

    /// Ring the input dispatcher pushes this core's packets to
    pub fn input(&self) -> Arc<ArrayQueue<Packet>> {
        Arc::clone(&self.input)
    }

    /// Process one received packet
    pub fn rx_packet(&mut self, pkt: Packet) {
        match pkt.packet_type() {
            PacketType::Interest => self.rx_interest(pkt),
            PacketType::Data => self.rx_data(pkt),
            PacketType::Nack => self.rx_nack(pkt),
        }
    }

    /// One loop iteration: a burst of input, async completions, then timers.
    /// Returns the number of input packets processed.
    pub fn run_once(&mut self) -> usize {
        let mut n = 0;
        while n < self.burst_size {
            let Some(pkt) = self.input.pop() else {
                break;
            };
            self.rx_packet(pkt);
            n += 1;
        }

        self.poll_digest();
        self.poll_disk();

        let now = self.clock.now();
        let mut fired = std::mem::take(&mut self.sg_fired);
        self.pcct.pit().trigger_timers(now, &mut fired);
        for h in fired.drain(..) {
            self.on_sg_timer(h, now);
        }
        self.sg_fired = fired;

        self.prune_fib_dyn();
        self.publish_stats();
        n
    }

    /// Drop strategy scratch of FIB entries that were erased or replaced
    fn prune_fib_dyn(&mut self) {
        let seq_num = self.fib.seq_num();
        if seq_num == self.fib_seen {
            return;
        }
        self.fib_seen = seq_num;
        let table = self.fib.load();
        let live: HashSet<u32> = table.iter().map(|e| e.seq_num()).collect();
        let before = self.fib_dyn.len();
        self.fib_dyn.retain(|_, fd| live.contains(&fd.seq_num));
        debug!(
            "Forwarding core {} dropped {} FIB scratch areas",
            self.id,
            before - self.fib_dyn.len()
        );
    }

    /// Loop until `stop` is set
    pub fn run(&mut self, stop: &AtomicBool) {
        info!("Forwarding core {} running", self.id);
        while !stop.load(Ordering::Acquire) {
            if self.run_once() == 0 {
                std::thread::yield_now();
            }
        }
        info!("Forwarding core {} stopped", self.id);
    }

    /// Copy the PCCT counters out for readers on other threads
    pub fn publish_stats(&mut self) {
        let n_pcc_entries = self.pcct.len();
        let pit = self.pcct.pit().counters();
        let cs = self.pcct.cs();
        let tables = TableStats {
            n_pcc_entries,
            pit,
            cs: cs.counters(),
            arc: ArcStats::of(cs.arc()),
        };
        self.stats.publish(tables);
    }

    fn on_sg_timer(&mut self, h: PitHandle, now: Time) {
        let table = self.fib.load();
        let Some(fib_entry) = self.pcct.pit_entry(h).and_then(|e| fib_for_pit(&table, e)) else {
            return;
        };
        self.invoke_strategy(SgEvent::Timer, None, &fib_entry, h, now);
    }

    /// Run the FIB entry's strategy on one event. Returns how many times it
    /// forwarded the Interest and whether it Nacked the downstreams.
    fn invoke_strategy(
        &mut self,
        event: SgEvent,
        pkt: Option<&Packet>,
        fib_entry: &FibEntry,
        h: PitHandle,
        now: Time,
    ) -> (u32, bool) {
        let FwFwd {
            id,
            pcct,
            fib_dyn,
            faces,
            strategies,
            default_sg,
            stats,
            ..
        } = self;
        let Some(strategy) = strategies
            .get(fib_entry.strategy())
            .or_else(|| strategies.get(*default_sg))
        else {
            return (0, false);
        };
        let scratch = fib_scratch(fib_dyn, fib_entry);
        let mut ctx = SgCtx::new(
            event,
            now,
            pkt,
            fib_entry,
            scratch,
            h,
            pcct,
            faces.as_ref(),
            *id,
            &stats.counters,
        );
        strategy.invoke(&mut ctx);
        (ctx.n_forwarded(), ctx.is_nacked())
    }

    /// Send Data to a downstream. `lp` carries the downstream's PIT token and
    /// congestion mark.
    fn tx_data(&self, face: FaceId, data: Data, lp: LpHeader) {
        if self.faces.is_down(face) {
            inc(&self.stats.counters.n_dropped_face_down);
            return;
        }
        inc(&self.stats.counters.n_data_tx);
        let mut pkt = Packet::data(FACE_INVALID, data, lp.pit_token);
        pkt.lp.cong_mark = lp.cong_mark;
        self.faces.tx(face, pkt);
    }

    fn tx_nack(&self, face: FaceId, interest: Interest, reason: NackReason, lp: LpHeader) {
        if self.faces.is_down(face) {
            inc(&self.stats.counters.n_dropped_face_down);
            return;
        }
        self.stats.counters.inc_nack_tx(reason);
        let mut pkt = Packet::nack(FACE_INVALID, Nack::new(interest, reason), lp.pit_token);
        pkt.lp.cong_mark = lp.cong_mark;
        self.faces.tx(face, pkt);
    }
}
