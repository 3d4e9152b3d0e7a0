//! Doubly linked lists threaded through the CS entries of the PCCT arena.

use crate::arena::{Arena, Idx};
use crate::pcct::PccEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ListLink {
    prev: Option<Idx>,
    next: Option<Idx>,
}

fn link_mut(entries: &mut Arena<PccEntry>, idx: Idx) -> &mut ListLink {
    match entries.get_mut(idx).and_then(|e| e.cs.as_mut()) {
        Some(cs) => &mut cs.link,
        None => panic!("CS list references {:?} without a CS entry", idx),
    }
}

#[derive(Debug, Default)]
pub(crate) struct CsList {
    head: Option<Idx>,
    tail: Option<Idx>,
    count: usize,
}

impl CsList {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn front(&self) -> Option<Idx> {
        self.head
    }

    pub fn push_back(&mut self, entries: &mut Arena<PccEntry>, idx: Idx) {
        *link_mut(entries, idx) = ListLink {
            prev: self.tail,
            next: None,
        };
        match self.tail {
            Some(tail) => link_mut(entries, tail).next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.count += 1;
    }

    /// Unlink `idx`, which must be a member of this list
    pub fn remove(&mut self, entries: &mut Arena<PccEntry>, idx: Idx) {
        let link = std::mem::take(link_mut(entries, idx));
        match link.prev {
            Some(prev) => link_mut(entries, prev).next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => link_mut(entries, next).prev = link.prev,
            None => self.tail = link.prev,
        }
        self.count -= 1;
    }

    pub fn iter<'a>(&self, entries: &'a Arena<PccEntry>) -> impl Iterator<Item = Idx> + 'a {
        std::iter::successors(self.head, move |idx| {
            entries.get(*idx).and_then(|e| e.cs.as_ref()).and_then(|cs| cs.link.next)
        })
    }
}
