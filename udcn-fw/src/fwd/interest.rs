use std::sync::Arc;
use std::time::Duration;

use log::{trace, warn};
use udcn_common::{fw_token_new, FaceId, NackReason, FACE_INVALID};
use udcn_core::{Interest, Packet, L3};

use super::counters::inc;
use super::{FwFwd, FwFwdCounters};
use crate::clock::Time;
use crate::cs::CsHit;
use crate::face::FaceTx;
use crate::fib::{FibEntry, FibRef, FibTable};
use crate::pcct::Pcct;
use crate::pit::{PitHandle, PitInsertResult};
use crate::strategy::{SgEvent, SgForwardResult};

/// Longest prefix match on the Interest name, then on each forwarding hint.
/// Entries whose only nexthop is the downstream are skipped.
fn lookup_fib(table: &FibTable, interest: &Interest, rx_face: FaceId) -> Option<(Arc<FibEntry>, Option<usize>)> {
    let usable = |e: &&Arc<FibEntry>| e.nexthops().iter().any(|nh| *nh != rx_face);
    if let Some(entry) = table.lpm(&interest.name).filter(usable) {
        return Some((Arc::clone(entry), None));
    }
    interest
        .fwhints
        .iter()
        .enumerate()
        .find_map(|(i, fh)| table.lpm(fh).filter(usable).map(|e| (Arc::clone(e), Some(i))))
}

/// Transmit the Interest of PIT entry `h` to upstream record `up` on `nh`
#[allow(clippy::too_many_arguments)]
pub(crate) fn send_upstream(
    pcct: &mut Pcct,
    h: PitHandle,
    up: usize,
    nh: FaceId,
    nonce: u32,
    now: Time,
    core: u8,
    faces: &dyn FaceTx,
    counters: &FwFwdCounters,
) -> SgForwardResult {
    let Some(entry) = pcct.pit_entry(h) else {
        return SgForwardResult::AllocError;
    };
    let interest = entry.interest();
    let hop_limit = match interest.hop_limit {
        Some(h) if h <= 1 => return SgForwardResult::HopZero,
        Some(h) => Some(h - 1),
        None => None,
    };
    let lifetime = Duration::from_nanos(entry.expiry().saturating_sub(now));
    let mut outgoing = interest.modify_guiders(nonce, lifetime, hop_limit);
    outgoing.can_be_prefix = entry.can_be_prefix();

    let token = match pcct.add_token(h.pcc) {
        Ok(token) => fw_token_new(core, token),
        Err(e) => {
            warn!("Cannot assign PIT token: {}", e);
            return SgForwardResult::AllocError;
        }
    };
    let mut pkt = Packet::interest(FACE_INVALID, outgoing);
    pkt.lp.pit_token = Some(token);
    faces.tx(nh, pkt);
    pcct.pit().record_tx(h, up, now, nonce);
    inc(&counters.n_interest_tx);
    SgForwardResult::Ok
}

impl FwFwd {
    pub(crate) fn rx_interest(&mut self, pkt: Packet) {
        inc(&self.stats.counters.n_interest_rx);
        self.process_interest(pkt);
    }

    /// Interest pipeline: FIB lookup, PIT insertion or CS answer, strategy
    pub(crate) fn process_interest(&mut self, mut pkt: Packet) {
        let now = self.clock.now();
        let rx_face = pkt.rx_face;
        let lp = pkt.lp;
        let L3::Interest(interest) = &mut pkt.l3 else {
            return;
        };
        if interest.name.has_digest_comp() && self.digest.is_none() {
            inc(&self.stats.counters.n_no_digest_helper);
            return;
        }

        let table = self.fib.load();
        let Some((fib_entry, fwhint)) = lookup_fib(&table, interest, rx_face) else {
            trace!("No route for {}", interest.name);
            inc(&self.stats.counters.n_no_fib_match);
            let interest = interest.clone();
            self.tx_nack(rx_face, interest, NackReason::NoRoute, lp);
            return;
        };
        drop(table);
        interest.active_fh = fwhint;

        let L3::Interest(interest) = &pkt.l3 else {
            return;
        };
        let fib_ref = FibRef::new(&fib_entry, fwhint);
        let h = match self.pcct.pit().insert(interest, Some(fib_ref), now) {
            PitInsertResult::Pit(h) => h,
            PitInsertResult::Full => {
                inc(&self.stats.counters.n_pit_full);
                self.tx_nack(rx_face, interest.clone(), NackReason::Congestion, lp);
                return;
            }
            PitInsertResult::Cs(CsHit::Memory(direct)) => {
                inc(&self.stats.counters.n_cs_hit_memory);
                if let Some(data) = self.pcct.cs_data(direct).cloned() {
                    self.tx_data(rx_face, data, lp);
                }
                return;
            }
            PitInsertResult::Cs(CsHit::Disk { direct, slot }) => {
                inc(&self.stats.counters.n_cs_hit_disk);
                if !self.pcct.cs().read_disk(direct, slot, pkt) {
                    inc(&self.stats.counters.n_disk_failed);
                }
                return;
            }
        };

        let nonce = interest.nonce;
        if let Some(other) = self
            .pcct
            .pit_entry(h)
            .and_then(|e| e.find_duplicate_nonce(nonce, rx_face))
        {
            trace!("Nonce {:08x} on face {} already seen from face {}", nonce, rx_face, other);
            inc(&self.stats.counters.n_dup_nonce);
            self.tx_nack(rx_face, interest.clone(), NackReason::Duplicate, lp);
            return;
        }

        if self.pcct.pit().insert_dn(h, &pkt, now).is_none() {
            inc(&self.stats.counters.n_dn_full);
            self.tx_nack(rx_face, interest.clone(), NackReason::Congestion, lp);
            if self.pcct.pit_entry(h).is_some_and(|e| e.dns().is_empty()) {
                self.pcct.pit().erase(h);
            }
            return;
        }

        let (n_forwarded, nacked) = self.invoke_strategy(SgEvent::Interest, Some(&pkt), &fib_entry, h, now);
        if n_forwarded == 0 && !nacked {
            inc(&self.stats.counters.n_sg_no_fwd);
        }
    }
}
