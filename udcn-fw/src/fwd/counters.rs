use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use udcn_common::NackReason;

use crate::cs::{CsArc, CsCounters, CsListId};
use crate::pit::PitCounters;

/// Per-core forwarding counters. Written by the owning core only, readable
/// from any thread.
#[derive(Debug, Default)]
pub struct FwFwdCounters {
    pub n_interest_rx: AtomicU64,
    pub n_data_rx: AtomicU64,
    pub n_nack_rx: AtomicU64,
    pub n_interest_tx: AtomicU64,
    pub n_data_tx: AtomicU64,
    nack_tx: [AtomicU64; 4],
    pub n_no_fib_match: AtomicU64,
    pub n_dup_nonce: AtomicU64,
    pub n_sg_no_fwd: AtomicU64,
    pub n_nack_mismatch: AtomicU64,
    pub n_data_no_pit: AtomicU64,
    pub n_cs_hit_memory: AtomicU64,
    pub n_cs_hit_disk: AtomicU64,
    pub n_pit_full: AtomicU64,
    pub n_dn_full: AtomicU64,
    pub n_no_digest_helper: AtomicU64,
    pub n_digest_queued: AtomicU64,
    pub n_digest_failed: AtomicU64,
    pub n_disk_failed: AtomicU64,
    pub n_dropped_face_down: AtomicU64,
}

#[inline]
pub(crate) fn inc(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FwFwdCountersSnapshot {
    pub n_interest_rx: u64,
    pub n_data_rx: u64,
    pub n_nack_rx: u64,
    pub n_interest_tx: u64,
    pub n_data_tx: u64,
    pub n_nack_congestion_tx: u64,
    pub n_nack_duplicate_tx: u64,
    pub n_nack_no_route_tx: u64,
    pub n_nack_unspecified_tx: u64,
    pub n_no_fib_match: u64,
    pub n_dup_nonce: u64,
    pub n_sg_no_fwd: u64,
    pub n_nack_mismatch: u64,
    pub n_data_no_pit: u64,
    pub n_cs_hit_memory: u64,
    pub n_cs_hit_disk: u64,
    pub n_pit_full: u64,
    pub n_dn_full: u64,
    pub n_no_digest_helper: u64,
    pub n_digest_queued: u64,
    pub n_digest_failed: u64,
    pub n_disk_failed: u64,
    pub n_dropped_face_down: u64,
}

impl FwFwdCounters {
    pub(crate) fn inc_nack_tx(&self, reason: NackReason) {
        inc(&self.nack_tx[reason.index()]);
    }

    pub fn n_nack_tx(&self, reason: NackReason) -> u64 {
        self.nack_tx[reason.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> FwFwdCountersSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        FwFwdCountersSnapshot {
            n_interest_rx: get(&self.n_interest_rx),
            n_data_rx: get(&self.n_data_rx),
            n_nack_rx: get(&self.n_nack_rx),
            n_interest_tx: get(&self.n_interest_tx),
            n_data_tx: get(&self.n_data_tx),
            n_nack_congestion_tx: self.n_nack_tx(NackReason::Congestion),
            n_nack_duplicate_tx: self.n_nack_tx(NackReason::Duplicate),
            n_nack_no_route_tx: self.n_nack_tx(NackReason::NoRoute),
            n_nack_unspecified_tx: self.n_nack_tx(NackReason::Unspecified),
            n_no_fib_match: get(&self.n_no_fib_match),
            n_dup_nonce: get(&self.n_dup_nonce),
            n_sg_no_fwd: get(&self.n_sg_no_fwd),
            n_nack_mismatch: get(&self.n_nack_mismatch),
            n_data_no_pit: get(&self.n_data_no_pit),
            n_cs_hit_memory: get(&self.n_cs_hit_memory),
            n_cs_hit_disk: get(&self.n_cs_hit_disk),
            n_pit_full: get(&self.n_pit_full),
            n_dn_full: get(&self.n_dn_full),
            n_no_digest_helper: get(&self.n_no_digest_helper),
            n_digest_queued: get(&self.n_digest_queued),
            n_digest_failed: get(&self.n_digest_failed),
            n_disk_failed: get(&self.n_disk_failed),
            n_dropped_face_down: get(&self.n_dropped_face_down),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ArcStats {
    pub capacity: usize,
    pub p: f64,
    pub t1: usize,
    pub b1: usize,
    pub t2: usize,
    pub b2: usize,
    pub del: usize,
}

impl ArcStats {
    pub fn of(arc: &CsArc) -> Self {
        Self {
            capacity: arc.capacity(),
            p: arc.p(),
            t1: arc.len(CsListId::T1),
            b1: arc.len(CsListId::B1),
            t2: arc.len(CsListId::T2),
            b2: arc.len(CsListId::B2),
            del: arc.len(CsListId::Del),
        }
    }
}

/// Table counters copied out of a core's PCCT once per loop iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TableStats {
    pub n_pcc_entries: usize,
    pub pit: PitCounters,
    pub cs: CsCounters,
    pub arc: ArcStats,
}

/// Everything a forwarding core exposes to the management side
#[derive(Debug, Default)]
pub struct FwFwdStats {
    pub counters: FwFwdCounters,
    tables: Mutex<TableStats>,
}

impl FwFwdStats {
    pub(crate) fn publish(&self, tables: TableStats) {
        *self.tables.lock() = tables;
    }

    pub fn tables(&self) -> TableStats {
        *self.tables.lock()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "fwd": self.counters.snapshot(),
            "tables": self.tables(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_json() {
        let stats = FwFwdStats::default();
        inc(&stats.counters.n_interest_rx);
        inc(&stats.counters.n_interest_rx);
        stats.counters.inc_nack_tx(NackReason::NoRoute);

        let snap = stats.counters.snapshot();
        assert_eq!(snap.n_interest_rx, 2);
        assert_eq!(snap.n_nack_no_route_tx, 1);
        assert_eq!(snap.n_nack_congestion_tx, 0);

        stats.publish(TableStats {
            n_pcc_entries: 3,
            ..TableStats::default()
        });
        let value: serde_json::Value = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
        assert_eq!(value["fwd"]["n_interest_rx"], 2);
        assert_eq!(value["tables"]["n_pcc_entries"], 3);
        assert_eq!(value["tables"]["arc"]["t1"], 0);
    }
}
