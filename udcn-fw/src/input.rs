//! Input dispatch to forwarding cores.
//!
//! Interests are sharded by a hash of their name prefix through the name
//! dispatch table (NDT). Data and Nacks carry a PIT token minted by the core
//! holding their PIT entry and are routed by the core id in its high bits.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use log::{debug, trace};
use serde::Serialize;
use udcn_common::{fw_token_core, PacketType};
use udcn_core::{Interest, Packet, L3};

use crate::config::InputConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FwInputCounters {
    /// Packets enqueued, per core
    pub n_accepted: Vec<u64>,
    /// Packets dropped on a full ring, per core
    pub n_dropped: Vec<u64>,
    pub n_token_routed: u64,
    pub n_no_token: u64,
    /// Token naming a core that does not exist
    pub n_bad_core: u64,
}

pub struct FwInput {
    ndt: Vec<AtomicU8>,
    ndt_hits: Vec<AtomicU32>,
    prefix_len: usize,
    queues: Vec<Arc<ArrayQueue<Packet>>>,
    n_accepted: Vec<AtomicU64>,
    n_dropped: Vec<AtomicU64>,
    n_token_routed: AtomicU64,
    n_no_token: AtomicU64,
    n_bad_core: AtomicU64,
}

impl FwInput {
    /// Dispatcher over the input rings of `queues.len()` cores. NDT buckets
    /// are assigned to cores round-robin.
    pub fn new(cfg: &InputConfig, queues: Vec<Arc<ArrayQueue<Packet>>>) -> Self {
        assert!(!queues.is_empty(), "no forwarding cores");
        let n_buckets = 1usize << cfg.ndt_bits;
        let n_cores = queues.len();
        debug!(
            "NDT: {} buckets over {} cores, prefix length {}",
            n_buckets, n_cores, cfg.ndt_prefix_len
        );
        Self {
            ndt: (0..n_buckets).map(|i| AtomicU8::new((i % n_cores) as u8)).collect(),
            ndt_hits: (0..n_buckets).map(|_| AtomicU32::new(0)).collect(),
            prefix_len: cfg.ndt_prefix_len,
            n_accepted: (0..n_cores).map(|_| AtomicU64::new(0)).collect(),
            n_dropped: (0..n_cores).map(|_| AtomicU64::new(0)).collect(),
            queues,
            n_token_routed: AtomicU64::new(0),
            n_no_token: AtomicU64::new(0),
            n_bad_core: AtomicU64::new(0),
        }
    }

    pub fn n_cores(&self) -> usize {
        self.queues.len()
    }

    pub fn n_buckets(&self) -> usize {
        self.ndt.len()
    }

    /// NDT bucket of an Interest: its forwarding hint if any, else its name
    pub fn bucket_of(&self, interest: &Interest) -> usize {
        let name = interest.fwhints.first().unwrap_or(&interest.name);
        let hash = name.prefix_hash(self.prefix_len.min(name.len()));
        (hash as usize) & (self.ndt.len() - 1)
    }

    pub fn ndt_core(&self, bucket: usize) -> Option<u8> {
        self.ndt.get(bucket).map(|c| c.load(Ordering::Relaxed))
    }

    /// Reassign an NDT bucket. Takes effect for the next dispatched packet.
    pub fn set_ndt(&self, bucket: usize, core: u8) -> bool {
        match self.ndt.get(bucket) {
            Some(entry) if (core as usize) < self.queues.len() => {
                entry.store(core, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    pub fn ndt_hits(&self, bucket: usize) -> u32 {
        self.ndt_hits.get(bucket).map_or(0, |h| h.load(Ordering::Relaxed))
    }

    /// Route a received packet to its forwarding core. False if dropped.
    pub fn dispatch(&self, pkt: Packet) -> bool {
        match pkt.packet_type() {
            PacketType::Interest => self.dispatch_by_name(pkt),
            PacketType::Data | PacketType::Nack => self.dispatch_by_token(pkt),
        }
    }

    pub fn dispatch_by_name(&self, pkt: Packet) -> bool {
        let L3::Interest(interest) = &pkt.l3 else {
            return false;
        };
        let bucket = self.bucket_of(interest);
        self.ndt_hits[bucket].fetch_add(1, Ordering::Relaxed);
        let core = self.ndt[bucket].load(Ordering::Relaxed);
        self.push(core, pkt)
    }

    pub fn dispatch_by_token(&self, pkt: Packet) -> bool {
        let Some(token) = pkt.lp.pit_token else {
            self.n_no_token.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let core = fw_token_core(token);
        if core as usize >= self.queues.len() {
            trace!("Token {:016x} names unknown core {}", token, core);
            self.n_bad_core.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.n_token_routed.fetch_add(1, Ordering::Relaxed);
        self.push(core, pkt)
    }

    fn push(&self, core: u8, pkt: Packet) -> bool {
        let i = core as usize;
        match self.queues[i].push(pkt) {
            Ok(()) => {
                self.n_accepted[i].fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.n_dropped[i].fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn counters(&self) -> FwInputCounters {
        let load = |v: &[AtomicU64]| -> Vec<u64> { v.iter().map(|c| c.load(Ordering::Relaxed)).collect() };
        FwInputCounters {
            n_accepted: load(&self.n_accepted),
            n_dropped: load(&self.n_dropped),
            n_token_routed: self.n_token_routed.load(Ordering::Relaxed),
            n_no_token: self.n_no_token.load(Ordering::Relaxed),
            n_bad_core: self.n_bad_core.load(Ordering::Relaxed),
        }
    }
}
