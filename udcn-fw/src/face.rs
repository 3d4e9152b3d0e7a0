//! Faces as seen by the forwarding cores: an output ring per face plus its
//! up/down state. The I/O side drains the rings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;
use udcn_common::{FaceId, FACE_INVALID};
use udcn_core::Packet;

use crate::error::FaceError;

/// Transmit side of the face layer used by forwarding cores
pub trait FaceTx: Send + Sync {
    /// Enqueue `pkt` for transmission on `face`. Never blocks.
    fn tx(&self, face: FaceId, pkt: Packet);

    fn is_down(&self, face: FaceId) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FaceCounters {
    pub n_tx: u64,
    pub n_dropped: u64,
}

pub struct FaceQueue {
    up: AtomicBool,
    queue: ArrayQueue<Packet>,
    n_tx: AtomicU64,
    n_dropped: AtomicU64,
}

impl FaceQueue {
    fn new(capacity: usize) -> Self {
        Self {
            up: AtomicBool::new(true),
            queue: ArrayQueue::new(capacity.max(1)),
            n_tx: AtomicU64::new(0),
            n_dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, pkt: Packet) {
        if !self.up.load(Ordering::Acquire) || self.queue.push(pkt).is_err() {
            self.n_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.n_tx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> FaceCounters {
        FaceCounters {
            n_tx: self.n_tx.load(Ordering::Relaxed),
            n_dropped: self.n_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
pub struct FaceTable {
    faces: RwLock<HashMap<FaceId, Arc<FaceQueue>>>,
    n_no_face: AtomicU64,
}

impl FaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a face in the up state with an output ring of `capacity` packets
    pub fn add(&self, face: FaceId, capacity: usize) -> Result<(), FaceError> {
        if face == FACE_INVALID {
            return Err(FaceError::InvalidFace(face));
        }
        let mut faces = self.faces.write();
        if faces.contains_key(&face) {
            return Err(FaceError::FaceAlreadyExists(face));
        }
        faces.insert(face, Arc::new(FaceQueue::new(capacity)));
        info!("Created face {} (ring capacity {})", face, capacity);
        Ok(())
    }

    pub fn remove(&self, face: FaceId) -> Result<(), FaceError> {
        match self.faces.write().remove(&face) {
            Some(_) => {
                info!("Deleted face {}", face);
                Ok(())
            }
            None => Err(FaceError::FaceNotFound(face)),
        }
    }

    pub fn set_down(&self, face: FaceId, down: bool) -> Result<(), FaceError> {
        let faces = self.faces.read();
        let queue = faces.get(&face).ok_or(FaceError::FaceNotFound(face))?;
        queue.up.store(!down, Ordering::Release);
        debug!("Face {} is {}", face, if down { "down" } else { "up" });
        Ok(())
    }

    pub fn get(&self, face: FaceId) -> Option<Arc<FaceQueue>> {
        self.faces.read().get(&face).cloned()
    }

    pub fn len(&self) -> usize {
        self.faces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.read().is_empty()
    }

    /// Take the next packet queued for output on `face`
    pub fn pop(&self, face: FaceId) -> Option<Packet> {
        self.get(face)?.queue.pop()
    }

    pub fn drain(&self, face: FaceId) -> Vec<Packet> {
        let Some(queue) = self.get(face) else {
            return Vec::new();
        };
        std::iter::from_fn(|| queue.queue.pop()).collect()
    }

    pub fn counters(&self, face: FaceId) -> Option<FaceCounters> {
        self.get(face).map(|q| q.counters())
    }

    /// Packets sent to faces that do not exist
    pub fn n_no_face(&self) -> u64 {
        self.n_no_face.load(Ordering::Relaxed)
    }
}

impl FaceTx for FaceTable {
    fn tx(&self, face: FaceId, pkt: Packet) {
        match self.faces.read().get(&face) {
            Some(queue) => queue.push(pkt),
            None => {
                self.n_no_face.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn is_down(&self, face: FaceId) -> bool {
        self.faces
            .read()
            .get(&face)
            .map_or(true, |q| !q.up.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udcn_core::{Interest, Name};

    fn packet(uri: &str) -> Packet {
        Packet::interest(1, Interest::new(Name::from_uri(uri).unwrap()))
    }

    #[test]
    fn test_add_remove() {
        let faces = FaceTable::new();
        assert_eq!(faces.add(0, 4), Err(FaceError::InvalidFace(0)));
        faces.add(1, 4).unwrap();
        assert_eq!(faces.add(1, 4), Err(FaceError::FaceAlreadyExists(1)));
        assert_eq!(faces.len(), 1);
        faces.remove(1).unwrap();
        assert_eq!(faces.remove(1), Err(FaceError::FaceNotFound(1)));
        assert!(faces.is_empty());
    }

    #[test]
    fn test_tx_and_drain() {
        let faces = FaceTable::new();
        faces.add(2, 2).unwrap();
        faces.tx(2, packet("/a"));
        faces.tx(2, packet("/b"));
        faces.tx(2, packet("/c"));
        faces.tx(9, packet("/d"));

        let out = faces.drain(2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name(), &Name::from_uri("/a").unwrap());
        assert_eq!(faces.counters(2), Some(FaceCounters { n_tx: 2, n_dropped: 1 }));
        assert_eq!(faces.n_no_face(), 1);
        assert!(faces.pop(2).is_none());
    }

    #[test]
    fn test_down_face_drops() {
        let faces = FaceTable::new();
        faces.add(3, 4).unwrap();
        assert!(!faces.is_down(3));
        assert!(faces.is_down(4));

        faces.set_down(3, true).unwrap();
        assert!(faces.is_down(3));
        faces.tx(3, packet("/a"));
        assert!(faces.pop(3).is_none());

        faces.set_down(3, false).unwrap();
        faces.tx(3, packet("/a"));
        assert!(faces.pop(3).is_some());
    }
}
