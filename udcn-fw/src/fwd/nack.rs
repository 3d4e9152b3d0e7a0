use log::trace;
use udcn_common::{NackReason, FACE_INVALID};
use udcn_core::{Nack, Packet, L3};

use super::counters::inc;
use super::{fib_for_pit, send_upstream, FwFwd, FwFwdCounters};
use crate::clock::Time;
use crate::face::FaceTx;
use crate::pcct::Pcct;
use crate::pit::PitHandle;
use crate::strategy::{SgEvent, SgForwardResult};

/// Nack every live downstream of a PIT entry with its own nonce and token,
/// then erase the entry.
pub(crate) fn nack_downstreams(
    pcct: &mut Pcct,
    h: PitHandle,
    reason: NackReason,
    now: Time,
    faces: &dyn FaceTx,
    counters: &FwFwdCounters,
) {
    let Some(entry) = pcct.pit_entry(h) else {
        return;
    };
    for dn in entry.dns().iter().filter(|dn| dn.expiry >= now) {
        if faces.is_down(dn.face) {
            inc(&counters.n_dropped_face_down);
            continue;
        }
        let mut interest = entry.interest().clone();
        interest.nonce = dn.nonce;
        counters.inc_nack_tx(reason);
        let mut pkt = Packet::nack(FACE_INVALID, Nack::new(interest, reason), dn.token);
        pkt.lp.cong_mark = dn.cong_mark;
        faces.tx(dn.face, pkt);
    }
    pcct.pit().erase(h);
}

impl FwFwd {
    pub(crate) fn rx_nack(&mut self, pkt: Packet) {
        inc(&self.stats.counters.n_nack_rx);
        let now = self.clock.now();
        let rx_face = pkt.rx_face;
        let L3::Nack(nack) = &pkt.l3 else {
            return;
        };
        let Some(h) = pkt
            .lp
            .pit_token
            .and_then(|token| self.pcct.pit().find_by_nack(nack, token))
        else {
            inc(&self.stats.counters.n_nack_mismatch);
            return;
        };

        let reason = nack.reason;
        let nonce = nack.interest.nonce;
        let up = self.pcct.pit_entry(h).and_then(|e| {
            let i = e.find_up(rx_face)?;
            (e.ups()[i].nonce() == nonce).then_some(i)
        });
        let Some(up) = up else {
            trace!("Nack from face {} nonce {:08x} matches no upstream", rx_face, nonce);
            inc(&self.stats.counters.n_nack_mismatch);
            return;
        };

        let Some(entry) = self.pcct.pit_entry_mut(h) else {
            return;
        };
        let record = &mut entry.ups_mut().as_mut_slice()[up];
        record.set_nack(reason);
        if reason == NackReason::Duplicate {
            record.add_rejected_nonce(nonce);
            if let Some(alt) = entry.choose_nonce(up, now) {
                let result = send_upstream(
                    &mut self.pcct,
                    h,
                    up,
                    rx_face,
                    alt,
                    now,
                    self.id,
                    self.faces.as_ref(),
                    &self.stats.counters,
                );
                if result == SgForwardResult::Ok {
                    return;
                }
            }
        }

        let table = self.fib.load();
        let fib_entry = self.pcct.pit_entry(h).and_then(|e| fib_for_pit(&table, e));
        drop(table);
        if let Some(fib_entry) = fib_entry {
            let (n_forwarded, nacked) = self.invoke_strategy(SgEvent::Nack, Some(&pkt), &fib_entry, h, now);
            if n_forwarded > 0 || nacked {
                return;
            }
        }

        let Some(entry) = self.pcct.pit_entry(h) else {
            return;
        };
        if entry.ups().iter().any(|up| up.nack().is_none() && up.n_tx() > 0) {
            // other upstreams may still answer
            return;
        }
        let reason = entry
            .ups()
            .iter()
            .filter_map(|up| up.nack())
            .reduce(NackReason::least_severe)
            .unwrap_or(reason);
        nack_downstreams(
            &mut self.pcct,
            h,
            reason,
            now,
            self.faces.as_ref(),
            &self.stats.counters,
        );
    }
}
