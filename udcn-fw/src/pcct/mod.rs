//! PIT-CS composite table.
//!
//! One `PccEntry` exists per distinct (name, forwarding hint) pair. It holds
//! up to two PIT entries (MustBeFresh 0 and 1) and one CS entry. Entries live
//! in a fixed-capacity arena indexed by key hash; a second index maps the
//! 48-bit token carried in upstream Interests back to the entry.

mod key;

use std::collections::HashMap;

use log::debug;
use udcn_common::PCC_TOKEN_MASK;

use crate::arena::{Arena, ExtPool, Idx};
use crate::clock::Time;
use crate::config::FwConfig;
use crate::cs::{Cs, CsEntry, CsState};
use crate::disk::{DiskStore, DiskTier};
use crate::error::PcctError;
use crate::pit::{Pit, PitEntry, PitState};

pub use key::{PccKey, PccSearch};

/// Extension blocks one key may chain
const PCC_KEY_MAX_EXT: usize = 4;

/// Attempts to find an unused token before giving up
const TOKEN_MAX_RETRY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Pit0,
    Pit1,
    Cs,
}

impl SlotKind {
    pub fn pit(must_be_fresh: bool) -> Self {
        if must_be_fresh {
            SlotKind::Pit1
        } else {
            SlotKind::Pit0
        }
    }
}

pub struct PccEntry {
    key: PccKey,
    key_hash: u64,
    token: Option<u64>,
    next_in_bucket: Option<Idx>,
    pub(crate) pit: [Option<PitEntry>; 2],
    pub(crate) cs: Option<CsEntry>,
}

impl PccEntry {
    pub fn key(&self) -> &PccKey {
        &self.key
    }

    pub fn token(&self) -> Option<u64> {
        self.token
    }

    pub fn pit_entry(&self, must_be_fresh: bool) -> Option<&PitEntry> {
        self.pit[must_be_fresh as usize].as_ref()
    }

    pub fn cs_entry(&self) -> Option<&CsEntry> {
        self.cs.as_ref()
    }

    pub fn has_slot(&self, kind: SlotKind) -> bool {
        match kind {
            SlotKind::Pit0 => self.pit[0].is_some(),
            SlotKind::Pit1 => self.pit[1].is_some(),
            SlotKind::Cs => self.cs.is_some(),
        }
    }

    pub fn has_pit(&self) -> bool {
        self.pit[0].is_some() || self.pit[1].is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_pit() && self.cs.is_none()
    }
}

pub struct Pcct {
    pub(crate) entries: Arena<PccEntry>,
    key_index: HashMap<u64, Idx>,
    token_index: HashMap<u64, Idx>,
    last_token: u64,
    pub(crate) ext: ExtPool,
    pub(crate) pit: PitState,
    pub(crate) cs: CsState,
}

impl Pcct {
    pub fn new(config: &FwConfig, now: Time) -> Self {
        debug!(
            "PCCT capacity={} ext={} cs={}",
            config.pcct.capacity, config.pcct.key_ext_capacity, config.cs.capacity
        );
        Self {
            entries: Arena::new(config.pcct.capacity),
            key_index: HashMap::new(),
            token_index: HashMap::new(),
            last_token: 0,
            ext: ExtPool::new(config.pcct.key_ext_capacity),
            pit: PitState::new(&config.pit, now),
            cs: CsState::new(&config.cs),
        }
    }

    /// Attach a disk tier with `n_slots` slots behind the CS
    pub fn attach_disk(&mut self, store: Box<dyn DiskStore>, n_slots: u64) {
        self.cs.disk = Some(DiskTier::new(store, n_slots));
    }

    pub fn pit(&mut self) -> Pit<'_> {
        Pit::new(self)
    }

    pub fn cs(&mut self) -> Cs<'_> {
        Cs::new(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn get(&self, idx: Idx) -> Option<&PccEntry> {
        self.entries.get(idx)
    }

    pub(crate) fn get_mut(&mut self, idx: Idx) -> Option<&mut PccEntry> {
        self.entries.get_mut(idx)
    }

    fn find_hashed(&self, hash: u64, search: &PccSearch<'_>) -> Option<Idx> {
        let mut cur = self.key_index.get(&hash).copied();
        while let Some(idx) = cur {
            let entry = self.entries.get(idx)?;
            if entry.key_hash == hash && entry.key.matches(search) {
                return Some(idx);
            }
            cur = entry.next_in_bucket;
        }
        None
    }

    pub fn find(&self, search: &PccSearch<'_>) -> Option<Idx> {
        self.find_hashed(search.hash(), search)
    }

    /// Find or create the entry for `search`. The flag is true for a new entry.
    pub fn insert(&mut self, search: &PccSearch<'_>) -> Result<(Idx, bool), PcctError> {
        let hash = search.hash();
        if let Some(idx) = self.find_hashed(hash, search) {
            return Ok((idx, false));
        }

        let ext_blocks = search.ext_blocks();
        if ext_blocks > PCC_KEY_MAX_EXT {
            return Err(PcctError::NameTooLong);
        }
        if !self.ext.take(ext_blocks) {
            return Err(PcctError::Full);
        }

        let entry = PccEntry {
            key: PccKey::new(search),
            key_hash: hash,
            token: None,
            next_in_bucket: self.key_index.get(&hash).copied(),
            pit: [None, None],
            cs: None,
        };
        match self.entries.alloc(entry) {
            Ok(idx) => {
                self.key_index.insert(hash, idx);
                Ok((idx, true))
            }
            Err(_) => {
                self.ext.give(ext_blocks);
                Err(PcctError::Full)
            }
        }
    }

    /// Remove an entry that has no occupied slot
    pub fn erase(&mut self, idx: Idx) {
        let (hash, next) = match self.entries.get(idx) {
            Some(entry) => {
                assert!(entry.is_empty(), "erasing PCC entry {:?} with occupied slots", idx);
                (entry.key_hash, entry.next_in_bucket)
            }
            None => panic!("erasing unknown PCC entry {:?}", idx),
        };
        self.remove_token(idx);

        let mut cur = self.key_index.get(&hash).copied();
        if cur == Some(idx) {
            match next {
                Some(n) => self.key_index.insert(hash, n),
                None => self.key_index.remove(&hash),
            };
        } else {
            while let Some(c) = cur {
                let Some(entry) = self.entries.get_mut(c) else {
                    break;
                };
                if entry.next_in_bucket == Some(idx) {
                    entry.next_in_bucket = next;
                    break;
                }
                cur = entry.next_in_bucket;
            }
        }

        if let Some(entry) = self.entries.free(idx) {
            self.ext.give(entry.key.ext_blocks());
        }
    }

    /// Erase the entry if it is empty; drop its token if no PIT entry remains
    pub(crate) fn release_if_unused(&mut self, idx: Idx) {
        let Some((empty, has_pit)) = self.entries.get(idx).map(|e| (e.is_empty(), e.has_pit())) else {
            return;
        };
        if empty {
            self.erase(idx);
        } else if !has_pit {
            self.remove_token(idx);
        }
    }

    /// Assign a token to the entry, or return the one it already has
    pub fn add_token(&mut self, idx: Idx) -> Result<u64, PcctError> {
        let entry = self.entries.get(idx).ok_or(PcctError::Full)?;
        if let Some(token) = entry.token {
            return Ok(token);
        }

        for _ in 0..TOKEN_MAX_RETRY {
            self.last_token = (self.last_token + 1) & PCC_TOKEN_MASK;
            let token = self.last_token;
            if token == 0 || self.token_index.contains_key(&token) {
                continue;
            }
            self.token_index.insert(token, idx);
            if let Some(entry) = self.entries.get_mut(idx) {
                entry.token = Some(token);
            }
            return Ok(token);
        }
        Err(PcctError::TokenExhausted)
    }

    pub fn remove_token(&mut self, idx: Idx) {
        if let Some(token) = self.entries.get_mut(idx).and_then(|e| e.token.take()) {
            self.token_index.remove(&token);
        }
    }

    /// Entry owning a PCC token; the core id bits of a forwarding token are ignored
    pub fn find_by_token(&self, token: u64) -> Option<Idx> {
        self.token_index.get(&(token & PCC_TOKEN_MASK)).copied()
    }

    #[cfg(test)]
    pub(crate) fn set_last_token(&mut self, token: u64) {
        self.last_token = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udcn_core::Name;

    fn pcct(capacity: usize) -> Pcct {
        let mut config = FwConfig::default();
        config.pcct.capacity = capacity;
        config.pcct.key_ext_capacity = 4;
        Pcct::new(&config, 1)
    }

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn test_insert_is_unique_per_key() {
        let mut pcct = pcct(16);
        let a = name("/a");
        let hint = name("/hint");
        let (i1, new1) = pcct.insert(&PccSearch::new(&a, None)).unwrap();
        let (i2, new2) = pcct.insert(&PccSearch::new(&a, None)).unwrap();
        let (i3, new3) = pcct.insert(&PccSearch::new(&a, Some(&hint))).unwrap();
        assert!(new1 && !new2 && new3);
        assert_eq!(i1, i2);
        assert_ne!(i1, i3);
        assert_eq!(pcct.len(), 2);
        assert_eq!(pcct.find(&PccSearch::new(&a, Some(&hint))), Some(i3));
    }

    #[test]
    fn test_full_table() {
        let mut pcct = pcct(2);
        pcct.insert(&PccSearch::new(&name("/a"), None)).unwrap();
        pcct.insert(&PccSearch::new(&name("/b"), None)).unwrap();
        assert_eq!(pcct.insert(&PccSearch::new(&name("/c"), None)), Err(PcctError::Full));
        // an existing key is still found
        assert!(pcct.insert(&PccSearch::new(&name("/a"), None)).is_ok());
    }

    #[test]
    fn test_erase_then_reinsert() {
        let mut pcct = pcct(4);
        let a = name("/a");
        let (i1, _) = pcct.insert(&PccSearch::new(&a, None)).unwrap();
        pcct.erase(i1);
        assert!(pcct.is_empty());
        assert_eq!(pcct.find(&PccSearch::new(&a, None)), None);
        let (i2, new) = pcct.insert(&PccSearch::new(&a, None)).unwrap();
        assert!(new);
        assert_ne!(i1, i2);
        assert!(pcct.get(i1).is_none());
    }

    #[test]
    fn test_bucket_chain_survives_middle_erase() {
        let mut pcct = pcct(8);
        let names: Vec<Name> = (0..5).map(|i| name(&format!("/n{}", i))).collect();
        let idx: Vec<Idx> = names
            .iter()
            .map(|n| pcct.insert(&PccSearch::new(n, None)).unwrap().0)
            .collect();
        pcct.erase(idx[2]);
        for (i, n) in names.iter().enumerate() {
            let found = pcct.find(&PccSearch::new(n, None));
            assert_eq!(found.is_some(), i != 2);
        }
    }

    #[test]
    fn test_long_key_uses_ext_blocks() {
        let mut pcct = pcct(8);
        let long = Name::from_components([vec![b'x'; 1000]]).unwrap();
        let (idx, _) = pcct.insert(&PccSearch::new(&long, None)).unwrap();
        assert_eq!(pcct.ext.used(), 2);
        let longer = Name::from_components([vec![b'y'; 2000]]).unwrap();
        assert_eq!(pcct.insert(&PccSearch::new(&longer, None)), Err(PcctError::Full));
        pcct.erase(idx);
        assert_eq!(pcct.ext.used(), 0);
    }

    #[test]
    fn test_token_round_trip() {
        let mut pcct = pcct(4);
        let (a, _) = pcct.insert(&PccSearch::new(&name("/a"), None)).unwrap();
        let token = pcct.add_token(a).unwrap();
        assert_ne!(token, 0);
        assert_eq!(pcct.add_token(a).unwrap(), token);
        assert_eq!(pcct.find_by_token(token), Some(a));
        assert_eq!(pcct.find_by_token(udcn_common::fw_token_new(3, token)), Some(a));

        pcct.erase(a);
        assert_eq!(pcct.find_by_token(token), None);
        let (b, _) = pcct.insert(&PccSearch::new(&name("/b"), None)).unwrap();
        assert_eq!(a.index(), b.index());
        assert_eq!(pcct.find_by_token(token), None);
    }

    #[test]
    fn test_token_skips_zero_and_used() {
        let mut pcct = pcct(4);
        let (a, _) = pcct.insert(&PccSearch::new(&name("/a"), None)).unwrap();
        let (b, _) = pcct.insert(&PccSearch::new(&name("/b"), None)).unwrap();
        pcct.set_last_token(PCC_TOKEN_MASK - 1);
        let ta = pcct.add_token(a).unwrap();
        assert_eq!(ta, PCC_TOKEN_MASK);
        let tb = pcct.add_token(b).unwrap();
        assert_eq!(tb, 1);
    }
}
