use log::{debug, trace};
use udcn_core::{LpHeader, Packet, L3};

use super::counters::inc;
use super::{fib_for_pit, FwFwd};
use crate::clock::Time;
use crate::disk::DiskCompletion;
use crate::pit::PitHandle;
use crate::strategy::SgEvent;

impl FwFwd {
    pub(crate) fn rx_data(&mut self, pkt: Packet) {
        inc(&self.stats.counters.n_data_rx);
        self.process_data(pkt);
    }

    /// Data pipeline: satisfy matching PIT entries, then cache
    fn process_data(&mut self, pkt: Packet) {
        let now = self.clock.now();
        let Some(token) = pkt.lp.pit_token else {
            inc(&self.stats.counters.n_data_no_pit);
            return;
        };
        let L3::Data(data) = &pkt.l3 else {
            return;
        };

        let found = self.pcct.pit().find_by_data(data, token);
        if !found.is_match() {
            if found.need_digest {
                let queued = match self.digest.as_mut() {
                    Some(helper) => helper.enqueue(pkt),
                    None => false,
                };
                if queued {
                    inc(&self.stats.counters.n_digest_queued);
                } else {
                    inc(&self.stats.counters.n_digest_failed);
                }
                return;
            }
            trace!("Unsolicited Data {} token={:016x}", data.name, token);
            inc(&self.stats.counters.n_data_no_pit);
            return;
        }

        // both slots may match; a downstream in both gets the Data twice
        for h in found.handles() {
            self.satisfy(h, &pkt, now);
        }

        let L3::Data(data) = pkt.l3 else {
            return;
        };
        self.pcct.cs().insert(data, &found, now);
    }

    fn satisfy(&mut self, h: PitHandle, pkt: &Packet, now: Time) {
        let L3::Data(data) = &pkt.l3 else {
            return;
        };
        let Some(entry) = self.pcct.pit_entry(h) else {
            return;
        };
        let interest_name = &entry.interest().name;
        for dn in entry
            .dns()
            .iter()
            .filter(|dn| dn.expiry >= now && dn.accepts(interest_name, &data.name))
        {
            let lp = LpHeader {
                pit_token: dn.token,
                cong_mark: dn.cong_mark,
            };
            self.tx_data(dn.face, data.clone(), lp);
        }

        // RTT sample only when a single transmission is outstanding
        let table = self.fib.load();
        let rtt_fib = entry
            .find_up(pkt.rx_face)
            .filter(|&up| entry.ups()[up].n_tx() == 1)
            .and_then(|_| fib_for_pit(&table, entry));
        drop(table);
        if let Some(fib_entry) = rtt_fib {
            self.invoke_strategy(SgEvent::Data, Some(pkt), &fib_entry, h, now);
        }
    }

    /// Resume Data packets whose implicit digest has been computed
    pub(crate) fn poll_digest(&mut self) {
        let Some(helper) = self.digest.as_mut() else {
            return;
        };
        let mut done = std::mem::take(&mut self.digest_done);
        helper.poll(&mut done);
        for completion in done.drain(..) {
            if completion.ok {
                self.process_data(completion.packet);
            } else {
                inc(&self.stats.counters.n_digest_failed);
            }
        }
        self.digest_done = done;
    }

    /// Answer Interests waiting on CS disk reads
    pub(crate) fn poll_disk(&mut self) {
        let mut done = std::mem::take(&mut self.disk_done);
        self.pcct.cs().poll_disk(&mut done);
        for DiskCompletion { request, result } in done.drain(..) {
            let failed = result.is_err();
            match self.pcct.cs().complete_disk_read(request.direct, request.slot, result) {
                Some(data) => {
                    let interest = &request.interest;
                    self.tx_data(interest.rx_face, data, interest.lp);
                }
                None => {
                    if failed {
                        inc(&self.stats.counters.n_disk_failed);
                    }
                    debug!("CS disk slot {} unusable, processing Interest again", request.slot);
                    self.process_interest(request.interest);
                }
            }
        }
        self.disk_done = done;
    }
}
