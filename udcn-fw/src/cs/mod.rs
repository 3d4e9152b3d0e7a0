//! Content Store.
//!
//! A direct entry sits on the PCC entry of the Data's exact name and owns the
//! cached Data (or the disk slot it was written to). An indirect entry sits on
//! the PCC entry of a shorter Interest name and points to one direct entry, so
//! that a prefix Interest can be answered without a name lookup.
//!
//! Direct entries are ordered by ARC; indirect entries by a plain LRU.

mod arc;
mod list;

use serde::Serialize;
use udcn_core::{Data, Interest, Packet};

use crate::arena::{Arena, Idx};
use crate::clock::{duration_ns, Time};
use crate::config::CsConfig;
use crate::disk::{DiskCompletion, DiskRead, DiskTier};
use crate::error::DiskError;
use crate::pcct::{PccEntry, PccSearch, Pcct};
use crate::pit::PitFindResult;

pub use arc::{CsArc, CsListId};
pub(crate) use list::{CsList, ListLink};

/// Where the Data answering an Interest can be found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsHit {
    Memory(Idx),
    /// Data must be read back from the disk tier first
    Disk { direct: Idx, slot: u64 },
}

impl CsHit {
    pub fn direct(&self) -> Idx {
        match *self {
            CsHit::Memory(idx) => idx,
            CsHit::Disk { direct, .. } => direct,
        }
    }
}

/// A cached Data packet, held in memory or on the disk tier
#[derive(Debug)]
pub struct CsDirect {
    /// `None` while the packet lives only on disk
    data: Option<Data>,
    /// Last instant MustBeFresh Interests may be answered from this entry
    fresh_until: Time,
    /// Disk slot holding the packet, if it was moved out of memory
    disk_slot: Option<u64>,
    /// Indirect entries pointing here, at most `CS_MAX_INDIRECTS`
    indirects: Vec<Idx>,
}

impl CsDirect {
    pub fn data(&self) -> Option<&Data> {
        self.data.as_ref()
    }

    pub fn fresh_until(&self) -> Time {
        self.fresh_until
    }

    pub fn disk_slot(&self) -> Option<u64> {
        self.disk_slot
    }

    pub fn indirects(&self) -> &[Idx] {
        &self.indirects
    }
}

#[derive(Debug)]
pub enum CsKind {
    Direct(CsDirect),
    Indirect(Idx),
}

#[derive(Debug)]
pub struct CsEntry {
    pub(crate) link: ListLink,
    pub(crate) list: Option<CsListId>,
    kind: CsKind,
}

impl CsEntry {
    fn new(kind: CsKind) -> Self {
        Self {
            link: ListLink::default(),
            list: None,
            kind,
        }
    }

    pub fn list(&self) -> Option<CsListId> {
        self.list
    }

    pub fn kind(&self) -> &CsKind {
        &self.kind
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.kind, CsKind::Direct(_))
    }

    pub fn as_direct(&self) -> Option<&CsDirect> {
        match &self.kind {
            CsKind::Direct(d) => Some(d),
            CsKind::Indirect(_) => None,
        }
    }

    /// Direct entry this entry resolves to
    pub fn indirect_target(&self) -> Option<Idx> {
        match self.kind {
            CsKind::Indirect(direct) => Some(direct),
            CsKind::Direct(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CsCounters {
    pub n_hit_memory: u64,
    pub n_hit_disk: u64,
    pub n_miss: u64,
    pub n_direct: u64,
    pub n_indirect: u64,
    pub n_evict: u64,
    pub n_disk_insert: u64,
    pub n_disk_delete: u64,
    pub n_disk_full: u64,
    pub n_disk_failed: u64,
}

pub struct CsState {
    cfg: CsConfig,
    arc: CsArc,
    indirect_lru: CsList,
    pub(crate) counters: CsCounters,
    pub(crate) disk: Option<DiskTier>,
}

impl CsState {
    pub fn new(cfg: &CsConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            arc: CsArc::new(cfg.capacity),
            indirect_lru: CsList::default(),
            counters: CsCounters::default(),
            disk: None,
        }
    }
}

fn direct_mut(entries: &mut Arena<PccEntry>, idx: Idx) -> Option<&mut CsDirect> {
    match &mut entries.get_mut(idx)?.cs.as_mut()?.kind {
        CsKind::Direct(d) => Some(d),
        CsKind::Indirect(_) => None,
    }
}

/// ARC move hook: drops Data leaving T1/T2, writing it to the disk tier
/// first when entering a ghost list, and releases disk slots entering Del.
fn arc_move(
    entries: &mut Arena<PccEntry>,
    disk: &mut Option<DiskTier>,
    counters: &mut CsCounters,
    idx: Idx,
    from: Option<CsListId>,
    to: CsListId,
) {
    let Some(from) = from else {
        return;
    };
    let Some(d) = direct_mut(entries, idx) else {
        return;
    };
    if from.is_cached() && to.is_ghost() {
        if let (Some(tier), None, Some(data)) = (disk.as_mut(), d.disk_slot, &d.data) {
            match tier.alloc_slot() {
                Some(slot) => {
                    tier.put(slot, data);
                    d.disk_slot = Some(slot);
                    counters.n_disk_insert += 1;
                }
                None => counters.n_disk_full += 1,
            }
        }
        d.data = None;
    } else if to == CsListId::Del {
        d.data = None;
        if let (Some(tier), Some(slot)) = (disk.as_mut(), d.disk_slot.take()) {
            tier.free_slot(slot);
            counters.n_disk_delete += 1;
        }
    }
}

impl Pcct {
    /// Cached Data of a direct CS entry
    pub fn cs_data(&self, direct: Idx) -> Option<&Data> {
        self.get(direct)?.cs_entry()?.as_direct()?.data()
    }
}

pub struct Cs<'a> {
    pcct: &'a mut Pcct,
}

impl<'a> Cs<'a> {
    pub fn new(pcct: &'a mut Pcct) -> Self {
        Self { pcct }
    }

    pub fn counters(&self) -> CsCounters {
        self.pcct.cs.counters
    }

    pub fn arc(&self) -> &CsArc {
        &self.pcct.cs.arc
    }

    pub fn n_indirect_lru(&self) -> usize {
        self.pcct.cs.indirect_lru.len()
    }

    pub fn has_disk(&self) -> bool {
        self.pcct.cs.disk.is_some()
    }

    /// Direct entries in one ARC list, front (least recent) first
    pub fn list_members(&self, list: CsListId) -> Vec<Idx> {
        self.pcct.cs.arc.iter(list, &self.pcct.entries).collect()
    }

    fn add_to_arc(&mut self, idx: Idx) {
        let Pcct { entries, cs, .. } = &mut *self.pcct;
        let CsState {
            arc, disk, counters, ..
        } = cs;
        arc.add(
            entries,
            idx,
            &mut |entries: &mut Arena<PccEntry>, idx: Idx, from: Option<CsListId>, to: CsListId| {
                arc_move(entries, disk, counters, idx, from, to)
            },
        );
    }

    /// Look for Data on `pcc` able to answer `interest`. A hit counts as an
    /// access of the direct entry.
    pub fn match_interest(&mut self, pcc: Idx, interest: &Interest, now: Time) -> Option<CsHit> {
        let cs = self.pcct.get(pcc)?.cs_entry()?;
        let direct_idx = cs.indirect_target().unwrap_or(pcc);
        let direct_entry = self.pcct.get(direct_idx)?;
        let direct = direct_entry.cs_entry()?.as_direct()?;

        if !interest.can_be_prefix && direct_entry.key().name().len() > interest.name.len() {
            return None;
        }
        if interest.must_be_fresh && direct.fresh_until <= now {
            return None;
        }
        let hit = match (&direct.data, direct.disk_slot) {
            (Some(_), _) => CsHit::Memory(direct_idx),
            (None, Some(slot)) => CsHit::Disk {
                direct: direct_idx,
                slot,
            },
            (None, None) => return None,
        };

        if direct_idx != pcc {
            let Pcct { entries, cs, .. } = &mut *self.pcct;
            cs.indirect_lru.remove(entries, pcc);
            cs.indirect_lru.push_back(entries, pcc);
        }
        self.add_to_arc(direct_idx);
        let counters = &mut self.pcct.cs.counters;
        match hit {
            CsHit::Memory(_) => counters.n_hit_memory += 1,
            CsHit::Disk { .. } => counters.n_hit_disk += 1,
        }
        Some(hit)
    }

    /// Cache `data`, which satisfied the PIT entries in `found`. Those PIT
    /// entries are erased; their PCC entry is reused for the CS entry.
    pub fn insert(&mut self, data: Data, found: &PitFindResult, now: Time) {
        let Some(pcc) = found.pcc else {
            return;
        };
        let fresh_until = now.saturating_add(duration_ns(data.freshness_period));
        let is_direct = self
            .pcct
            .get(pcc)
            .is_some_and(|e| e.key().fwhint().is_none() && *e.key().name() == data.name);

        if is_direct {
            for h in found.handles() {
                self.pcct.pit().erase_raw(h);
            }
            self.put_direct_at(pcc, data, fresh_until);
            self.pcct.release_if_unused(pcc);
        } else {
            match self.put_direct(data, fresh_until) {
                Some(direct) => {
                    for h in found.handles() {
                        self.pcct.pit().erase_raw(h);
                    }
                    self.put_indirect(pcc, direct);
                    self.pcct.release_if_unused(pcc);
                }
                None => {
                    for h in found.handles() {
                        self.pcct.pit().erase(h);
                    }
                }
            }
        }
        self.evict();
    }

    /// Cache `data` in a direct entry at its own name
    pub(crate) fn put_direct(&mut self, data: Data, fresh_until: Time) -> Option<Idx> {
        let (idx, _) = self.pcct.insert(&PccSearch::new(&data.name, None)).ok()?;
        self.put_direct_at(idx, data, fresh_until);
        Some(idx)
    }

    fn put_direct_at(&mut self, pcc: Idx, data: Data, fresh_until: Time) {
        let existing = self.pcct.get(pcc).and_then(|e| e.cs_entry()).map(CsEntry::is_direct);
        match existing {
            Some(true) => {
                let Pcct { entries, cs, .. } = &mut *self.pcct;
                if let Some(d) = direct_mut(entries, pcc) {
                    d.data = Some(data);
                    d.fresh_until = fresh_until;
                    // the slot holds the previous Data
                    if let (Some(tier), Some(slot)) = (cs.disk.as_mut(), d.disk_slot.take()) {
                        tier.free_slot(slot);
                        cs.counters.n_disk_delete += 1;
                    }
                }
            }
            Some(false) | None => {
                if existing.is_some() {
                    self.unlink_indirect(pcc);
                }
                let Some(entry) = self.pcct.entries.get_mut(pcc) else {
                    return;
                };
                entry.cs = Some(CsEntry::new(CsKind::Direct(CsDirect {
                    data: Some(data),
                    fresh_until,
                    disk_slot: None,
                    indirects: Vec::new(),
                })));
                self.pcct.cs.counters.n_direct += 1;
            }
        }
        self.add_to_arc(pcc);
    }

    /// Make `pcc` an alias of `direct`. Fails silently when `direct` already
    /// has the maximum number of aliases.
    fn put_indirect(&mut self, pcc: Idx, direct: Idx) -> bool {
        let cfg = &self.pcct.cs.cfg;
        if cfg.indirect_capacity == 0 {
            return false;
        }
        let max_indirects = cfg.max_indirects;
        let current = self.pcct.get(pcc).and_then(|e| e.cs_entry()).map(|cs| cs.indirect_target());
        if current == Some(Some(direct)) {
            let Pcct { entries, cs, .. } = &mut *self.pcct;
            cs.indirect_lru.remove(entries, pcc);
            cs.indirect_lru.push_back(entries, pcc);
            return true;
        }
        let n_indirects = self
            .pcct
            .get(direct)
            .and_then(|e| e.cs_entry())
            .and_then(CsEntry::as_direct)
            .map_or(usize::MAX, |d| d.indirects.len());
        if n_indirects >= max_indirects {
            return false;
        }

        match current {
            Some(Some(_)) => self.unlink_indirect(pcc),
            Some(None) => self.erase_cs(pcc),
            None => {}
        }

        let Pcct { entries, cs, .. } = &mut *self.pcct;
        let Some(entry) = entries.get_mut(pcc) else {
            return false;
        };
        let mut indirect = CsEntry::new(CsKind::Indirect(direct));
        indirect.list = Some(CsListId::Indirect);
        entry.cs = Some(indirect);
        cs.indirect_lru.push_back(entries, pcc);
        if let Some(d) = direct_mut(entries, direct) {
            d.indirects.push(pcc);
        }
        cs.counters.n_indirect += 1;

        if cs.indirect_lru.len() > cs.cfg.indirect_capacity {
            if let Some(oldest) = cs.indirect_lru.front() {
                self.erase(oldest);
            }
        }
        true
    }

    /// Remove an indirect entry from its direct entry and from the LRU
    fn unlink_indirect(&mut self, idx: Idx) {
        let Pcct { entries, cs, .. } = &mut *self.pcct;
        let Some(direct) = entries.get(idx).and_then(|e| e.cs_entry()).and_then(CsEntry::indirect_target) else {
            return;
        };
        cs.indirect_lru.remove(entries, idx);
        if let Some(d) = direct_mut(entries, direct) {
            d.indirects.retain(|i| *i != idx);
        }
        if let Some(entry) = entries.get_mut(idx) {
            entry.cs = None;
        }
        cs.counters.n_indirect -= 1;
    }

    /// Remove the CS entry of `idx` but leave the PCC entry in place. Erasing
    /// a direct entry erases its indirect entries too.
    fn erase_cs(&mut self, idx: Idx) {
        let Some(is_direct) = self.pcct.get(idx).and_then(|e| e.cs_entry()).map(CsEntry::is_direct) else {
            return;
        };
        if !is_direct {
            self.unlink_indirect(idx);
            return;
        }

        let Pcct { entries, cs, .. } = &mut *self.pcct;
        cs.arc.remove(entries, idx);
        let Some(CsEntry {
            kind: CsKind::Direct(direct),
            ..
        }) = entries.get_mut(idx).and_then(|e| e.cs.take())
        else {
            unreachable!("direct CS entry {:?} changed kind during erase", idx);
        };
        if let (Some(tier), Some(slot)) = (cs.disk.as_mut(), direct.disk_slot) {
            tier.free_slot(slot);
            cs.counters.n_disk_delete += 1;
        }
        cs.counters.n_direct -= 1;

        for indirect in direct.indirects {
            self.unlink_indirect(indirect);
            self.pcct.release_if_unused(indirect);
        }
    }

    /// Erase the CS entry of `idx`, and the PCC entry if nothing else uses it
    pub fn erase(&mut self, idx: Idx) {
        self.erase_cs(idx);
        self.pcct.release_if_unused(idx);
    }

    /// Release deleted entries once enough have accumulated
    pub(crate) fn evict(&mut self) {
        if self.pcct.cs.arc.len(CsListId::Del) < self.pcct.cs.cfg.evict_bulk {
            return;
        }
        while let Some(idx) = self.pcct.cs.arc.del_front() {
            self.erase(idx);
            self.pcct.cs.counters.n_evict += 1;
        }
    }

    /// Start reading a disk-resident entry on behalf of `interest`
    pub fn read_disk(&mut self, direct: Idx, slot: u64, interest: Packet) -> bool {
        match self.pcct.cs.disk.as_mut() {
            Some(tier) => {
                tier.read(DiskRead { direct, slot, interest });
                true
            }
            None => false,
        }
    }

    pub fn poll_disk(&mut self, out: &mut Vec<DiskCompletion>) {
        if let Some(tier) = self.pcct.cs.disk.as_mut() {
            tier.poll(out);
        }
    }

    /// Apply a finished disk read. Returns the Data if the entry still
    /// refers to that slot; a failed read erases the entry.
    pub fn complete_disk_read(&mut self, direct: Idx, slot: u64, result: Result<Data, DiskError>) -> Option<Data> {
        let entry = self.pcct.get(direct)?;
        let cs = entry.cs_entry()?;
        let current = cs.as_direct()?;
        if !cs.list.is_some_and(CsListId::is_cached) || current.disk_slot != Some(slot) {
            return None;
        }
        let key_name = entry.key().name().clone();

        match result {
            Ok(data) if data.name == key_name => {
                let d = direct_mut(&mut self.pcct.entries, direct)?;
                Some(d.data.get_or_insert(data).clone())
            }
            _ => {
                self.pcct.cs.counters.n_disk_failed += 1;
                self.erase(direct);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FwConfig;
    use crate::disk::MemDiskStore;
    use crate::pit::PitInsertResult;
    use std::time::Duration;
    use udcn_core::Name;

    const MS: u64 = 1_000_000;

    fn pcct(capacity: usize) -> Pcct {
        let mut config = FwConfig::default();
        config.pcct.capacity = 256;
        config.cs.capacity = capacity;
        config.cs.evict_bulk = 1000;
        Pcct::new(&config, 1)
    }

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn data(uri: &str) -> Data {
        Data::new(name(uri), "x").with_freshness_period(Duration::from_millis(1000))
    }

    /// Pending Interest answered by `data`
    fn satisfy(pcct: &mut Pcct, interest: Interest, data: Data, now: Time) -> Idx {
        let PitInsertResult::Pit(h) = pcct.pit().insert(&interest, None, now) else {
            panic!("expected PIT entry");
        };
        pcct.pit().insert_dn(h, &Packet::interest(1, interest), now).unwrap();
        let token = pcct.add_token(h.pcc).unwrap();
        let found = pcct.pit().find_by_data(&data, token);
        assert!(found.is_match());
        pcct.cs().insert(data, &found, now);
        h.pcc
    }

    fn put(pcct: &mut Pcct, uri: &str) -> Idx {
        pcct.cs().put_direct(data(uri), 1000 * MS).unwrap()
    }

    fn list_of(pcct: &Pcct, idx: Idx) -> Option<CsListId> {
        pcct.get(idx)?.cs_entry()?.list()
    }

    fn check_arc(pcct: &mut Pcct) {
        let cs = pcct.cs();
        let arc = cs.arc();
        let c = arc.capacity();
        assert!(arc.len(CsListId::T1) + arc.len(CsListId::T2) <= c);
        assert!(arc.len(CsListId::B1) <= c);
        assert!(arc.len(CsListId::B2) <= 2 * c);
        assert!(arc.p() >= 0.0 && arc.p() <= c as f64);
    }

    #[test]
    fn test_direct_entry_reuses_pit_slot() {
        let mut pcct = pcct(8);
        let interest = Interest::new(name("/a/b")).with_nonce(1);
        let pcc = satisfy(&mut pcct, interest, data("/a/b"), MS);

        let entry = pcct.get(pcc).unwrap();
        assert!(!entry.has_pit());
        assert!(entry.cs_entry().unwrap().is_direct());
        assert_eq!(entry.token(), None);
        assert_eq!(pcct.len(), 1);
        assert_eq!(list_of(&pcct, pcc), Some(CsListId::T1));
        assert_eq!(pcct.cs_data(pcc).unwrap().name, name("/a/b"));
    }

    #[test]
    fn test_cs_answers_interest() {
        let mut pcct = pcct(8);
        let pcc = satisfy(&mut pcct, Interest::new(name("/a/b")), data("/a/b"), MS);

        let again = Interest::new(name("/a/b")).with_must_be_fresh(true);
        assert_eq!(pcct.pit().insert(&again, None, 500 * MS), PitInsertResult::Cs(CsHit::Memory(pcc)));
        assert_eq!(list_of(&pcct, pcc), Some(CsListId::T2));

        // stale for MustBeFresh, still fine without it
        assert!(matches!(pcct.pit().insert(&again, None, 1001 * MS), PitInsertResult::Pit(_)));
        let plain = Interest::new(name("/a/b"));
        assert!(matches!(pcct.pit().insert(&plain, None, 1001 * MS), PitInsertResult::Cs(_)));

        let counters = pcct.cs().counters();
        assert_eq!(counters.n_hit_memory, 2);
        assert_eq!(counters.n_miss, 2);
    }

    #[test]
    fn test_prefix_interest_gets_indirect_entry() {
        let mut pcct = pcct(8);
        let prefix = Interest::new(name("/a")).with_can_be_prefix(true);
        let pcc = satisfy(&mut pcct, prefix.clone(), data("/a/b"), MS);

        let direct = pcct.get(pcc).unwrap().cs_entry().unwrap().indirect_target().unwrap();
        assert_eq!(pcct.get(direct).unwrap().key().name(), &name("/a/b"));
        assert_eq!(pcct.cs().counters().n_indirect, 1);
        assert_eq!(pcct.cs().n_indirect_lru(), 1);

        assert_eq!(pcct.pit().insert(&prefix, None, 2 * MS), PitInsertResult::Cs(CsHit::Memory(direct)));
        // without CanBePrefix the longer Data does not match
        let exact = Interest::new(name("/a"));
        assert!(matches!(pcct.pit().insert(&exact, None, 2 * MS), PitInsertResult::Pit(_)));
    }

    #[test]
    fn test_erasing_direct_erases_indirects() {
        let mut pcct = pcct(8);
        let prefix = Interest::new(name("/a")).with_can_be_prefix(true);
        let pcc = satisfy(&mut pcct, prefix, data("/a/b"), MS);
        let direct = pcct.get(pcc).unwrap().cs_entry().unwrap().indirect_target().unwrap();

        pcct.cs().erase(direct);
        assert!(pcct.is_empty());
        let counters = pcct.cs().counters();
        assert_eq!(counters.n_direct, 0);
        assert_eq!(counters.n_indirect, 0);
        assert_eq!(pcct.cs().n_indirect_lru(), 0);
    }

    #[test]
    fn test_indirect_limit_fails_silently() {
        let mut config = FwConfig::default();
        config.cs.max_indirects = 1;
        let mut pcct = Pcct::new(&config, 1);
        let d = data("/x/y/z");
        satisfy(&mut pcct, Interest::new(name("/x")).with_can_be_prefix(true), d.clone(), MS);
        let second = satisfy(&mut pcct, Interest::new(name("/x/y")).with_can_be_prefix(true), d, MS);

        assert!(pcct.get(second).is_none());
        assert_eq!(pcct.len(), 2);
        assert_eq!(pcct.cs().counters().n_indirect, 1);
    }

    #[test]
    fn test_exact_data_replaces_indirect() {
        let mut pcct = pcct(8);
        let pcc = satisfy(&mut pcct, Interest::new(name("/a")).with_can_be_prefix(true), data("/a/b"), MS);
        let direct = put(&mut pcct, "/a");
        assert_eq!(direct, pcc);
        assert!(pcct.get(pcc).unwrap().cs_entry().unwrap().is_direct());

        let other = pcct.find(&PccSearch::new(&name("/a/b"), None)).unwrap();
        assert!(pcct.get(other).unwrap().cs_entry().unwrap().as_direct().unwrap().indirects().is_empty());
        assert_eq!(pcct.cs().counters().n_indirect, 0);
    }

    #[test]
    fn test_second_insert_promotes_to_t2() {
        let mut pcct = pcct(4);
        let a = put(&mut pcct, "/A");
        assert_eq!(list_of(&pcct, a), Some(CsListId::T1));
        put(&mut pcct, "/A");
        assert_eq!(list_of(&pcct, a), Some(CsListId::T2));
        assert_eq!(pcct.cs().arc().len(CsListId::T1), 0);
    }

    #[test]
    fn test_full_t1_overflows_to_del() {
        let mut pcct = pcct(4);
        let idx: Vec<Idx> = ["/A", "/B", "/C", "/D", "/E"].iter().map(|n| put(&mut pcct, n)).collect();
        assert_eq!(list_of(&pcct, idx[0]), Some(CsListId::Del));
        assert!(pcct.cs_data(idx[0]).is_none());
        assert_eq!(pcct.cs().list_members(CsListId::T1), idx[1..].to_vec());
    }

    #[test]
    fn test_del_drained_in_bulk() {
        let mut config = FwConfig::default();
        config.cs.capacity = 1;
        config.cs.evict_bulk = 2;
        let mut pcct = Pcct::new(&config, 1);
        for n in ["/A", "/B"] {
            put(&mut pcct, n);
            pcct.cs().evict();
        }
        assert_eq!(pcct.len(), 2);
        put(&mut pcct, "/C");
        pcct.cs().evict();
        assert_eq!(pcct.len(), 1);
        assert_eq!(pcct.cs().counters().n_evict, 2);
        assert!(pcct.find(&PccSearch::new(&name("/C"), None)).is_some());
    }

    #[test]
    fn test_arc_bounds_hold() {
        let mut pcct = pcct(4);
        let names: Vec<String> = (0..12).map(|i| format!("/n{}", i)).collect();
        // a mix of fresh names and repeats of recent ones
        for round in 0..6 {
            for (i, n) in names.iter().enumerate() {
                if (i + round) % 3 != 0 {
                    put(&mut pcct, n);
                    check_arc(&mut pcct);
                }
            }
        }
    }

    #[test]
    fn test_ghost_entry_read_back_from_disk() {
        let mut pcct = pcct(2);
        pcct.attach_disk(Box::new(MemDiskStore::new()), 4);
        let x = put(&mut pcct, "/X");
        put(&mut pcct, "/X");
        let a = put(&mut pcct, "/A");
        put(&mut pcct, "/C");
        assert_eq!(list_of(&pcct, x), Some(CsListId::T2));
        assert_eq!(list_of(&pcct, a), Some(CsListId::B1));
        assert!(pcct.cs_data(a).is_none());
        assert_eq!(pcct.cs().counters().n_disk_insert, 1);

        let interest = Interest::new(name("/A"));
        let PitInsertResult::Cs(CsHit::Disk { direct, slot }) = pcct.pit().insert(&interest, None, 2 * MS) else {
            panic!("expected disk hit");
        };
        assert_eq!(direct, a);
        assert_eq!(list_of(&pcct, a), Some(CsListId::T2));

        assert!(pcct.cs().read_disk(direct, slot, Packet::interest(1, interest)));
        let mut done = Vec::new();
        pcct.cs().poll_disk(&mut done);
        assert_eq!(done.len(), 1);
        let c = done.pop().unwrap();
        let got = pcct.cs().complete_disk_read(c.request.direct, c.request.slot, c.result).unwrap();
        assert_eq!(got.name, name("/A"));
        assert!(pcct.cs_data(a).is_some());
    }

    #[test]
    fn test_failed_disk_read_erases_entry() {
        let mut pcct = pcct(2);
        pcct.attach_disk(Box::new(MemDiskStore::new()), 4);
        put(&mut pcct, "/X");
        put(&mut pcct, "/X");
        let a = put(&mut pcct, "/A");
        put(&mut pcct, "/C");
        let slot = pcct.get(a).unwrap().cs_entry().unwrap().as_direct().unwrap().disk_slot().unwrap();
        // still in B1: completion is ignored
        assert!(pcct
            .cs()
            .complete_disk_read(a, slot, Err(DiskError::EmptySlot(slot)))
            .is_none());
        assert!(pcct.get(a).is_some());

        pcct.pit().insert(&Interest::new(name("/A")), None, 2 * MS);
        assert!(pcct
            .cs()
            .complete_disk_read(a, slot, Err(DiskError::EmptySlot(slot)))
            .is_none());
        assert!(pcct.get(a).map_or(true, |e| e.cs_entry().is_none()));
        assert_eq!(pcct.cs().counters().n_disk_failed, 1);
        assert_eq!(pcct.cs().counters().n_disk_delete, 1);
    }
}
