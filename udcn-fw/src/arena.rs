//! Fixed-capacity slab with generational handles.

use std::fmt;

/// Handle to an arena slot. The generation makes handles to freed slots
/// stale instead of aliasing whatever reuses the slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Idx {
    index: u32,
    generation: u32,
}

impl Idx {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Idx({}v{})", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("arena is full")]
pub struct ArenaFull;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slots are created lazily up to `capacity` and recycled through a free list.
/// The arena never grows past its capacity.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    capacity: usize,
}

impl<T> Arena<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity <= u32::MAX as usize, "arena capacity too large");
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            capacity,
        }
    }

    pub fn alloc(&mut self, value: T) -> Result<Idx, ArenaFull> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
            None => return Err(ArenaFull),
        };
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        self.len += 1;
        Ok(Idx {
            index,
            generation: slot.generation,
        })
    }

    pub fn free(&mut self, idx: Idx) -> Option<T> {
        let slot = self.slots.get_mut(idx.index as usize)?;
        if slot.generation != idx.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(idx.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, idx: Idx) -> Option<&T> {
        let slot = self.slots.get(idx.index as usize)?;
        if slot.generation != idx.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, idx: Idx) -> Option<&mut T> {
        let slot = self.slots.get_mut(idx.index as usize)?;
        if slot.generation != idx.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, idx: Idx) -> bool {
        self.get(idx).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = (Idx, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    Idx {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    v,
                )
            })
        })
    }
}

/// Budget of extension blocks shared by long PCC keys and PIT record overflow
#[derive(Debug, Clone)]
pub struct ExtPool {
    capacity: usize,
    used: usize,
}

impl ExtPool {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, used: 0 }
    }

    /// Take `n` blocks, all or nothing
    pub fn take(&mut self, n: usize) -> bool {
        if self.capacity - self.used < n {
            return false;
        }
        self.used += n;
        true
    }

    pub fn give(&mut self, n: usize) {
        debug_assert!(n <= self.used);
        self.used -= n.min(self.used);
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn available(&self) -> usize {
        self.capacity - self.used
    }
}
