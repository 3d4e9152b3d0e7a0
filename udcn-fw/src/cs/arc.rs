//! Adaptive Replacement Cache over direct CS entries.
//!
//! T1 holds entries seen once and T2 entries seen at least twice; B1 and B2
//! are their ghost lists. Entries pushed out of the ghost lists go to Del,
//! which the CS drains in bulk. `p` is the adaptive target size of T1.
//!
//! Every list transition of an entry is reported to a move hook, which is
//! where cached Data is dropped or written out to the disk tier.

use crate::arena::{Arena, Idx};
use crate::pcct::PccEntry;

use super::list::CsList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsListId {
    T1,
    B1,
    T2,
    B2,
    Del,
    /// LRU of indirect entries, outside of ARC
    Indirect,
}

impl CsListId {
    /// Lists whose entries hold cached Data
    pub fn is_cached(self) -> bool {
        matches!(self, CsListId::T1 | CsListId::T2)
    }

    pub fn is_ghost(self) -> bool {
        matches!(self, CsListId::B1 | CsListId::B2)
    }
}

fn list_of(entries: &Arena<PccEntry>, idx: Idx) -> Option<CsListId> {
    entries.get(idx)?.cs.as_ref()?.list
}

pub struct CsArc {
    c: usize,
    p: f64,
    t1: CsList,
    b1: CsList,
    t2: CsList,
    b2: CsList,
    del: CsList,
}

impl CsArc {
    pub fn new(capacity: usize) -> Self {
        Self {
            c: capacity,
            p: 0.0,
            t1: CsList::default(),
            b1: CsList::default(),
            t2: CsList::default(),
            b2: CsList::default(),
            del: CsList::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.c
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    pub fn len(&self, list: CsListId) -> usize {
        match list {
            CsListId::T1 => self.t1.len(),
            CsListId::B1 => self.b1.len(),
            CsListId::T2 => self.t2.len(),
            CsListId::B2 => self.b2.len(),
            CsListId::Del => self.del.len(),
            CsListId::Indirect => 0,
        }
    }

    pub(crate) fn del_front(&self) -> Option<Idx> {
        self.del.front()
    }

    pub(crate) fn iter<'a>(&self, list: CsListId, entries: &'a Arena<PccEntry>) -> impl Iterator<Item = Idx> + 'a {
        let list = match list {
            CsListId::T1 => &self.t1,
            CsListId::B1 => &self.b1,
            CsListId::T2 => &self.t2,
            CsListId::B2 => &self.b2,
            CsListId::Del | CsListId::Indirect => &self.del,
        };
        list.iter(entries)
    }

    fn list_mut(&mut self, list: CsListId) -> &mut CsList {
        match list {
            CsListId::T1 => &mut self.t1,
            CsListId::B1 => &mut self.b1,
            CsListId::T2 => &mut self.t2,
            CsListId::B2 => &mut self.b2,
            CsListId::Del => &mut self.del,
            CsListId::Indirect => panic!("indirect entries are not tracked by ARC"),
        }
    }

    fn move_to<F>(&mut self, entries: &mut Arena<PccEntry>, idx: Idx, to: CsListId, hook: &mut F)
    where
        F: FnMut(&mut Arena<PccEntry>, Idx, Option<CsListId>, CsListId),
    {
        let from = list_of(entries, idx);
        if let Some(from) = from {
            self.list_mut(from).remove(entries, idx);
        }
        self.list_mut(to).push_back(entries, idx);
        if let Some(cs) = entries.get_mut(idx).and_then(|e| e.cs.as_mut()) {
            cs.list = Some(to);
        }
        hook(entries, idx, from, to);
    }

    fn move_front<F>(&mut self, entries: &mut Arena<PccEntry>, from: CsListId, to: CsListId, hook: &mut F)
    where
        F: FnMut(&mut Arena<PccEntry>, Idx, Option<CsListId>, CsListId),
    {
        if let Some(idx) = self.list_mut(from).front() {
            self.move_to(entries, idx, to, hook);
        }
    }

    /// Evict one entry from T1 or T2 into its ghost list
    fn replace<F>(&mut self, entries: &mut Arena<PccEntry>, is_b2: bool, hook: &mut F)
    where
        F: FnMut(&mut Arena<PccEntry>, Idx, Option<CsListId>, CsListId),
    {
        let t1 = self.t1.len() as f64;
        if (t1 > 0.0 && (t1 > self.p || (is_b2 && t1 == self.p))) || self.t2.len() == 0 {
            self.move_front(entries, CsListId::T1, CsListId::B1, hook);
        } else {
            self.move_front(entries, CsListId::T2, CsListId::B2, hook);
        }
    }

    /// Record an access to `idx`, inserting it into T1 if untracked
    pub(crate) fn add<F>(&mut self, entries: &mut Arena<PccEntry>, idx: Idx, hook: &mut F)
    where
        F: FnMut(&mut Arena<PccEntry>, Idx, Option<CsListId>, CsListId),
    {
        let c = self.c as f64;
        match list_of(entries, idx) {
            Some(CsListId::T1) | Some(CsListId::T2) => {
                self.move_to(entries, idx, CsListId::T2, hook);
            }
            Some(CsListId::B1) => {
                let delta = (self.b2.len() as f64 / self.b1.len() as f64).max(1.0);
                self.p = (self.p + delta).min(c);
                self.replace(entries, false, hook);
                self.move_to(entries, idx, CsListId::T2, hook);
            }
            Some(CsListId::B2) => {
                let delta = (self.b1.len() as f64 / self.b2.len() as f64).max(1.0);
                self.p = (self.p - delta).max(0.0);
                self.replace(entries, true, hook);
                self.move_to(entries, idx, CsListId::T2, hook);
            }
            Some(CsListId::Del) | Some(CsListId::Indirect) | None => {
                let t1_b1 = self.t1.len() + self.b1.len();
                if t1_b1 == self.c {
                    if self.t1.len() < self.c {
                        self.move_front(entries, CsListId::B1, CsListId::Del, hook);
                        self.replace(entries, false, hook);
                    } else {
                        self.move_front(entries, CsListId::T1, CsListId::Del, hook);
                    }
                } else {
                    let total = t1_b1 + self.t2.len() + self.b2.len();
                    if total >= self.c {
                        if total >= 2 * self.c {
                            self.move_front(entries, CsListId::B2, CsListId::Del, hook);
                        }
                        self.replace(entries, false, hook);
                    }
                }
                self.move_to(entries, idx, CsListId::T1, hook);
            }
        }
    }

    /// Take `idx` out of whichever ARC list holds it
    pub(crate) fn remove(&mut self, entries: &mut Arena<PccEntry>, idx: Idx) {
        let Some(list) = list_of(entries, idx) else {
            return;
        };
        self.list_mut(list).remove(entries, idx);
        if let Some(cs) = entries.get_mut(idx).and_then(|e| e.cs.as_mut()) {
            cs.list = None;
        }
    }
}
