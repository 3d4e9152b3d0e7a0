//! Pending Interest Table.
//!
//! PIT entries live in the PIT0/PIT1 slots of PCC entries. `Pit` is a
//! short-lived view over the owning `Pcct`; per-shard state (timer wheel,
//! counters) lives in `PitState`.

mod entry;

use std::time::Duration;

use serde::Serialize;
use udcn_common::FaceId;
use udcn_core::{Data, DataSatisfyResult, Interest, L3, Nack, Packet};

use crate::arena::{Arena, Idx};
use crate::clock::{Time, duration_ns};
use crate::config::PitConfig;
use crate::cs::CsHit;
use crate::fib::FibRef;
use crate::pcct::{PccEntry, PccSearch, Pcct};
use crate::timer::{TimerId, TimerWheel};

pub use entry::{PitDn, PitEntry, PitUp};
use entry::RecordLimits;

/// Reference to a PIT entry: its PCC entry and MustBeFresh slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PitHandle {
    pub pcc: Idx,
    pub must_be_fresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitInsertResult {
    Pit(PitHandle),
    /// The Interest can be answered from the CS
    Cs(CsHit),
    Full,
}

/// PIT entries a Data can satisfy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PitFindResult {
    pub pcc: Option<Idx>,
    pub pit0: bool,
    pub pit1: bool,
    pub need_digest: bool,
}

impl PitFindResult {
    pub fn is_match(&self) -> bool {
        self.pit0 || self.pit1
    }

    pub fn handles(&self) -> impl Iterator<Item = PitHandle> + '_ {
        let pcc = self.pcc;
        [(self.pit0, false), (self.pit1, true)]
            .into_iter()
            .filter(|(matched, _)| *matched)
            .filter_map(move |(_, must_be_fresh)| pcc.map(|pcc| PitHandle { pcc, must_be_fresh }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PitCounters {
    pub n_entries: u64,
    pub n_insert: u64,
    pub n_found: u64,
    pub n_cs_match: u64,
    pub n_alloc_err: u64,
    pub n_expired: u64,
    pub n_data_hit: u64,
    pub n_data_miss: u64,
    pub n_nack_hit: u64,
    pub n_nack_miss: u64,
}

pub struct PitState {
    cfg: PitConfig,
    timers: TimerWheel<PitHandle>,
    fired: Vec<(TimerId, PitHandle)>,
    pub(crate) counters: PitCounters,
}

impl PitState {
    pub fn new(cfg: &PitConfig, now: Time) -> Self {
        Self {
            cfg: cfg.clone(),
            timers: TimerWheel::new(cfg.timer_slot(), cfg.max_lifetime(), now),
            fired: Vec::new(),
            counters: PitCounters::default(),
        }
    }

    pub fn config(&self) -> &PitConfig {
        &self.cfg
    }

    fn dn_limits(&self) -> RecordLimits {
        RecordLimits {
            inline: self.cfg.dn_inline,
            per_ext: self.cfg.dn_ext,
            max_ext_hops: self.cfg.max_ext_hops,
        }
    }

    fn up_limits(&self) -> RecordLimits {
        RecordLimits {
            inline: self.cfg.up_inline,
            per_ext: self.cfg.up_ext,
            max_ext_hops: self.cfg.max_ext_hops,
        }
    }
}

fn slot_mut(entries: &mut Arena<PccEntry>, h: PitHandle) -> Option<&mut PitEntry> {
    entries.get_mut(h.pcc)?.pit[h.must_be_fresh as usize].as_mut()
}

impl Pcct {
    pub fn pit_entry(&self, h: PitHandle) -> Option<&PitEntry> {
        self.get(h.pcc)?.pit_entry(h.must_be_fresh)
    }

    pub(crate) fn pit_entry_mut(&mut self, h: PitHandle) -> Option<&mut PitEntry> {
        slot_mut(&mut self.entries, h)
    }
}

pub struct Pit<'a> {
    pcct: &'a mut Pcct,
}

impl<'a> Pit<'a> {
    pub fn new(pcct: &'a mut Pcct) -> Self {
        Self { pcct }
    }

    pub fn counters(&self) -> PitCounters {
        self.pcct.pit.counters
    }

    /// Pending timers, including stale ones not yet fired
    pub fn n_timers(&self) -> usize {
        self.pcct.pit.timers.len()
    }

    /// Find or create the PIT entry for `interest`, unless the CS can answer it
    pub fn insert(&mut self, interest: &Interest, fib_ref: Option<FibRef>, now: Time) -> PitInsertResult {
        let search = PccSearch::new(&interest.name, interest.active_fwhint());
        let (pcc, is_new) = match self.pcct.insert(&search) {
            Ok(r) => r,
            Err(_) => {
                self.pcct.pit.counters.n_alloc_err += 1;
                return PitInsertResult::Full;
            }
        };

        if !is_new {
            if let Some(hit) = self.pcct.cs().match_interest(pcc, interest, now) {
                self.pcct.pit.counters.n_cs_match += 1;
                return PitInsertResult::Cs(hit);
            }
        }
        self.pcct.cs.counters.n_miss += 1;

        let mbf = interest.must_be_fresh;
        let h = PitHandle {
            pcc,
            must_be_fresh: mbf,
        };
        let cfg = &self.pcct.pit.cfg;
        let counters = &mut self.pcct.pit.counters;
        let Some(entry) = self.pcct.entries.get_mut(pcc) else {
            unreachable!("PCC entry {:?} vanished during PIT insert", pcc);
        };
        let slot = &mut entry.pit[mbf as usize];
        if let Some(pit) = slot.as_mut() {
            counters.n_found += 1;
            pit.set_fib_ref(fib_ref);
        } else {
            *slot = Some(PitEntry::new(interest.clone(), fib_ref, cfg));
            counters.n_insert += 1;
            counters.n_entries += 1;
        }
        PitInsertResult::Pit(h)
    }

    /// Record the downstream of an Interest packet, refreshing the record of
    /// the same face or reusing an expired one. Re-arms the expiry timer.
    pub fn insert_dn(&mut self, h: PitHandle, pkt: &Packet, now: Time) -> Option<usize> {
        let L3::Interest(interest) = &pkt.l3 else {
            return None;
        };
        let limits = self.pcct.pit.dn_limits();
        let lifetime = interest.lifetime.min(self.pcct.pit.cfg.max_lifetime());
        let dn = PitDn {
            face: pkt.rx_face,
            expiry: now + duration_ns(lifetime),
            token: pkt.lp.pit_token,
            nonce: interest.nonce,
            cong_mark: pkt.lp.cong_mark,
            can_be_prefix: interest.can_be_prefix,
        };

        let entry = slot_mut(&mut self.pcct.entries, h)?;
        let dns = entry.dns_mut();
        let existing = dns
            .as_slice()
            .iter()
            .position(|d| d.face == dn.face)
            .or_else(|| dns.as_slice().iter().position(|d| d.expiry < now));
        let index = match existing {
            Some(i) => {
                dns.as_mut_slice()[i] = dn;
                i
            }
            None => dns.push(dn, limits, &mut self.pcct.ext)?,
        };

        entry.set_interest(interest.clone());
        entry.refresh_expiry();
        if !entry.has_sg_timer {
            entry.timer = Some(self.pcct.pit.timers.schedule(entry.expiry(), h));
        }
        Some(index)
    }

    /// Find or create the upstream record for `face`
    pub fn reserve_up(&mut self, h: PitHandle, face: FaceId) -> Option<usize> {
        let limits = self.pcct.pit.up_limits();
        let rejected_cap = self.pcct.pit.cfg.rejected_nonces;
        let entry = slot_mut(&mut self.pcct.entries, h)?;
        if let Some(i) = entry.find_up(face) {
            return Some(i);
        }
        entry
            .ups_mut()
            .push(PitUp::new(face, rejected_cap), limits, &mut self.pcct.ext)
    }

    pub fn record_tx(&mut self, h: PitHandle, up: usize, now: Time, nonce: u32) {
        let cfg = &self.pcct.pit.cfg;
        if let Some(up) = slot_mut(&mut self.pcct.entries, h).and_then(|e| e.ups_mut().as_mut_slice().get_mut(up)) {
            up.record_tx(now, nonce, cfg);
        }
    }

    /// Arm a strategy timer `after` from now. Fails if it would not fire
    /// before the entry expires.
    pub fn set_sg_timer(&mut self, h: PitHandle, now: Time, after: Duration) -> bool {
        let deadline = now.saturating_add(duration_ns(after));
        let Some(entry) = slot_mut(&mut self.pcct.entries, h) else {
            return false;
        };
        if deadline >= entry.expiry() {
            return false;
        }
        entry.timer = Some(self.pcct.pit.timers.schedule(deadline, h));
        entry.has_sg_timer = true;
        true
    }

    /// PIT entries on the PCC entry owning `token` that `data` satisfies for
    /// at least one downstream
    pub fn find_by_data(&mut self, data: &Data, token: u64) -> PitFindResult {
        let mut result = PitFindResult::default();
        let found = self.pcct.find_by_token(token).and_then(|pcc| Some((pcc, self.pcct.get(pcc)?)));
        if let Some((pcc, entry)) = found {
            result.pcc = Some(pcc);
            for mbf in [false, true] {
                let Some(pit) = entry.pit_entry(mbf) else {
                    continue;
                };
                match data.can_satisfy_with(pit.interest(), pit.can_be_prefix()) {
                    DataSatisfyResult::Yes if mbf => result.pit1 = true,
                    DataSatisfyResult::Yes => result.pit0 = true,
                    DataSatisfyResult::NeedDigest => result.need_digest = true,
                    DataSatisfyResult::No => {}
                }
            }
        }

        let counters = &mut self.pcct.pit.counters;
        if result.is_match() {
            counters.n_data_hit += 1;
        } else if !result.need_digest {
            counters.n_data_miss += 1;
        }
        result
    }

    /// PIT entry a Nack refers to; the Interest name must match exactly
    pub fn find_by_nack(&mut self, nack: &Nack, token: u64) -> Option<PitHandle> {
        let found = self.pcct.find_by_token(token).and_then(|pcc| {
            let pit = self.pcct.get(pcc)?.pit_entry(nack.interest.must_be_fresh)?;
            (pit.interest().name == nack.interest.name).then_some(PitHandle {
                pcc,
                must_be_fresh: nack.interest.must_be_fresh,
            })
        });
        let counters = &mut self.pcct.pit.counters;
        match found {
            Some(_) => counters.n_nack_hit += 1,
            None => counters.n_nack_miss += 1,
        }
        found
    }

    /// Erase a PIT entry, releasing its PCC entry when nothing else uses it
    pub fn erase(&mut self, h: PitHandle) {
        self.erase_raw(h);
        self.pcct.release_if_unused(h.pcc);
    }

    /// Erase a PIT entry but leave the PCC entry in place
    pub(crate) fn erase_raw(&mut self, h: PitHandle) -> Option<PitEntry> {
        let entry = self.pcct.entries.get_mut(h.pcc)?.pit[h.must_be_fresh as usize].take()?;
        self.pcct.ext.give(entry.ext_blocks());
        self.pcct.pit.counters.n_entries -= 1;
        Some(entry)
    }

    /// Fire due timers. Expired entries are erased; entries whose strategy
    /// timer fired are re-armed for expiry and pushed to `sg_fired`.
    pub fn trigger_timers(&mut self, now: Time, sg_fired: &mut Vec<PitHandle>) {
        let mut fired = std::mem::take(&mut self.pcct.pit.fired);
        self.pcct.pit.timers.trigger(now, &mut fired);
        for (id, h) in fired.drain(..) {
            let Some(entry) = slot_mut(&mut self.pcct.entries, h) else {
                continue;
            };
            if entry.timer != Some(id) {
                continue;
            }
            if entry.has_sg_timer {
                entry.has_sg_timer = false;
                entry.timer = Some(self.pcct.pit.timers.schedule(entry.expiry(), h));
                sg_fired.push(h);
            } else {
                self.erase(h);
                self.pcct.pit.counters.n_expired += 1;
            }
        }
        self.pcct.pit.fired = fired;
    }
}
