//! Forwarding information base.
//!
//! Forwarding cores read a published `FibTable` through `ArcSwap`; the
//! control plane builds a modified copy and swaps it in. Every mutation
//! stamps the affected entry with a new sequence number so that PIT entries
//! can hold a `FibRef` and detect that the entry they saw was replaced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use log::info;
use parking_lot::Mutex;
use udcn_common::FaceId;
use udcn_core::{Interest, Name};

use crate::error::FibError;
use crate::strategy::StrategyId;

pub const FIB_MAX_NEXTHOPS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibEntry {
    name: Name,
    /// At most `FIB_MAX_NEXTHOPS`, in preference order
    nexthops: Vec<FaceId>,
    strategy: StrategyId,
    /// Value of the FIB sequence counter when this entry was inserted
    seq_num: u32,
}

impl FibEntry {
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn nexthops(&self) -> &[FaceId] {
        &self.nexthops
    }

    pub fn strategy(&self) -> StrategyId {
        self.strategy
    }

    pub fn seq_num(&self) -> u32 {
        self.seq_num
    }
}

/// Weak reference from a PIT entry to the FIB entry that matched its Interest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibRef {
    /// Forwarding hint index used for the lookup, or `None` for the Interest name
    pub fwhint: Option<usize>,
    pub prefix_len: usize,
    pub seq_num: u32,
}

impl FibRef {
    pub fn new(entry: &FibEntry, fwhint: Option<usize>) -> Self {
        Self {
            fwhint,
            prefix_len: entry.name.len(),
            seq_num: entry.seq_num,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FibTable {
    buckets: HashMap<u64, Vec<Arc<FibEntry>>>,
    len: usize,
    max_depth: usize,
}

impl FibTable {
    fn find_prefix(&self, name: &Name, n: usize) -> Option<&Arc<FibEntry>> {
        let prefix = name.prefix_value(n);
        self.buckets
            .get(&name.prefix_hash(n))?
            .iter()
            .find(|e| e.name.value() == prefix)
    }

    /// Exact match
    pub fn find(&self, name: &Name) -> Option<&Arc<FibEntry>> {
        self.find_prefix(name, name.len())
    }

    /// Longest prefix match
    pub fn lpm(&self, name: &Name) -> Option<&Arc<FibEntry>> {
        let depth = name.len().min(self.max_depth);
        (0..=depth).rev().find_map(|n| self.find_prefix(name, n))
    }

    /// Entry referenced by `fib_ref`, if it has not been replaced since
    pub fn resolve(&self, fib_ref: &FibRef, interest: &Interest) -> Option<&Arc<FibEntry>> {
        let name = match fib_ref.fwhint {
            Some(i) => interest.fwhints.get(i)?,
            None => &interest.name,
        };
        if fib_ref.prefix_len > name.len() {
            return None;
        }
        self.find_prefix(name, fib_ref.prefix_len)
            .filter(|e| e.seq_num == fib_ref.seq_num)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FibEntry>> + '_ {
        self.buckets.values().flatten()
    }

    fn put(&mut self, entry: Arc<FibEntry>) {
        self.max_depth = self.max_depth.max(entry.name.len());
        let bucket = self.buckets.entry(entry.name.hash_value()).or_default();
        match bucket.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => {
                bucket.push(entry);
                self.len += 1;
            }
        }
    }

    fn remove(&mut self, name: &Name) -> bool {
        let hash = name.hash_value();
        let Some(bucket) = self.buckets.get_mut(&hash) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|e| e.name != *name);
        if bucket.len() == before {
            return false;
        }
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        self.len -= 1;
        self.max_depth = self.iter().map(|e| e.name.len()).max().unwrap_or(0);
        true
    }
}

pub struct Fib {
    table: ArcSwap<FibTable>,
    seq: AtomicU32,
    writer: Mutex<()>,
}

impl Fib {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(FibTable::default()),
            seq: AtomicU32::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Read-side view; hold it for as long as entries from it are used
    pub fn load(&self) -> Guard<Arc<FibTable>> {
        self.table.load()
    }

    /// Sequence number of the latest mutation
    pub fn seq_num(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    /// Insert or replace an entry, returning its sequence number
    pub fn insert(&self, name: Name, nexthops: Vec<FaceId>, strategy: StrategyId) -> Result<u32, FibError> {
        if nexthops.is_empty() {
            return Err(FibError::NoNexthop);
        }
        if nexthops.len() > FIB_MAX_NEXTHOPS {
            return Err(FibError::TooManyNexthops(nexthops.len()));
        }

        let _guard = self.writer.lock();
        let seq_num = self.seq.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        info!("FIB insert {} nexthops={:?} strategy={} seq={}", name, nexthops, strategy, seq_num);
        let mut table = FibTable::clone(&self.table.load());
        table.put(Arc::new(FibEntry {
            name,
            nexthops,
            strategy,
            seq_num,
        }));
        self.table.store(Arc::new(table));
        Ok(seq_num)
    }

    pub fn erase(&self, name: &Name) -> bool {
        let _guard = self.writer.lock();
        let mut table = FibTable::clone(&self.table.load());
        if !table.remove(name) {
            return false;
        }
        let seq_num = self.seq.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        info!("FIB erase {} seq={}", name, seq_num);
        self.table.store(Arc::new(table));
        true
    }
}

impl Default for Fib {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn test_lpm() {
        let fib = Fib::new();
        fib.insert(name("/"), vec![1], 0).unwrap();
        fib.insert(name("/a"), vec![2], 0).unwrap();
        fib.insert(name("/a/b/c"), vec![3], 0).unwrap();

        let table = fib.load();
        assert_eq!(table.lpm(&name("/a/b")).unwrap().nexthops(), &[2]);
        assert_eq!(table.lpm(&name("/a/b/c/d")).unwrap().nexthops(), &[3]);
        assert_eq!(table.lpm(&name("/x")).unwrap().nexthops(), &[1]);
        assert!(table.find(&name("/a/b")).is_none());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_no_match_without_default_route() {
        let fib = Fib::new();
        fib.insert(name("/a"), vec![2], 0).unwrap();
        assert!(fib.load().lpm(&name("/b")).is_none());
    }

    #[test]
    fn test_reader_keeps_old_table() {
        let fib = Fib::new();
        fib.insert(name("/a"), vec![1], 0).unwrap();
        let old = fib.load();
        fib.erase(&name("/a"));
        assert!(old.lpm(&name("/a/b")).is_some());
        assert!(fib.load().lpm(&name("/a/b")).is_none());
    }

    #[test]
    fn test_fib_ref_detects_replacement() {
        let fib = Fib::new();
        fib.insert(name("/a"), vec![1], 0).unwrap();
        let interest = Interest::new(name("/a/b"));
        let fib_ref = {
            let table = fib.load();
            FibRef::new(table.lpm(&interest.name).unwrap(), None)
        };
        assert_eq!(fib_ref.prefix_len, 1);
        assert!(fib.load().resolve(&fib_ref, &interest).is_some());

        fib.insert(name("/a"), vec![1, 2], 0).unwrap();
        assert!(fib.load().resolve(&fib_ref, &interest).is_none());
    }

    #[test]
    fn test_fib_ref_through_fwhint() {
        let fib = Fib::new();
        fib.insert(name("/isp"), vec![7], 0).unwrap();
        let interest = Interest::new(name("/a")).with_fwhint(name("/isp/region"));
        let table = fib.load();
        let entry = table.lpm(&interest.fwhints[0]).unwrap();
        let fib_ref = FibRef::new(entry, Some(0));
        assert_eq!(table.resolve(&fib_ref, &interest).unwrap().nexthops(), &[7]);
    }

    #[test]
    fn test_nexthop_limits() {
        let fib = Fib::new();
        assert_eq!(fib.insert(name("/a"), vec![], 0), Err(FibError::NoNexthop));
        assert_eq!(
            fib.insert(name("/a"), (1..=9).collect(), 0),
            Err(FibError::TooManyNexthops(9))
        );
        assert_eq!(fib.seq_num(), 0);
    }
}
