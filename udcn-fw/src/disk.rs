//! Secondary storage tier for the Content Store.
//!
//! Data evicted from T1/T2 into a ghost list is written to a numbered disk
//! slot; a later CS hit on that entry reads it back asynchronously. Slot 0 is
//! never handed out.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::thread;

use anyhow::Context;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{info, warn};
use udcn_common::DISK_SLOT_INVALID;
use udcn_core::{Data, Packet};

use crate::arena::Idx;
use crate::error::DiskError;

/// Length prefix stored at the start of each file slot
const SLOT_HEADER_LEN: usize = 4;

/// Pending read of a disk slot on behalf of an Interest
#[derive(Debug, Clone)]
pub struct DiskRead {
    pub direct: Idx,
    pub slot: u64,
    pub interest: Packet,
}

#[derive(Debug)]
pub struct DiskCompletion {
    pub request: DiskRead,
    pub result: Result<Data, DiskError>,
}

/// Slot-addressed Data store. Writes are fire-and-forget; reads complete
/// through `poll`.
pub trait DiskStore: Send {
    fn put_data(&mut self, slot: u64, data: &Data);

    fn get_data(&mut self, request: DiskRead);

    /// Move finished reads into `out`
    fn poll(&mut self, out: &mut Vec<DiskCompletion>);
}

/// A disk store plus the allocator of its slots
pub struct DiskTier {
    store: Box<dyn DiskStore>,
    free: Vec<u64>,
    n_slots: u64,
}

impl DiskTier {
    pub fn new(store: Box<dyn DiskStore>, n_slots: u64) -> Self {
        Self {
            store,
            free: (1..=n_slots).rev().collect(),
            n_slots,
        }
    }

    pub fn n_slots(&self) -> u64 {
        self.n_slots
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    pub fn alloc_slot(&mut self) -> Option<u64> {
        self.free.pop()
    }

    pub fn free_slot(&mut self, slot: u64) {
        debug_assert!(slot != DISK_SLOT_INVALID && slot <= self.n_slots);
        self.free.push(slot);
    }

    pub fn put(&mut self, slot: u64, data: &Data) {
        self.store.put_data(slot, data);
    }

    pub fn read(&mut self, request: DiskRead) {
        self.store.get_data(request);
    }

    pub fn poll(&mut self, out: &mut Vec<DiskCompletion>) {
        self.store.poll(out);
    }
}

fn decode_slot(slot: u64, bytes: &[u8]) -> Result<Data, DiskError> {
    if bytes.is_empty() {
        return Err(DiskError::EmptySlot(slot));
    }
    let (data, _) = Data::decode(bytes)?;
    Ok(data)
}

/// In-process store keeping encoded Data in a map
#[derive(Default)]
pub struct MemDiskStore {
    slots: HashMap<u64, Vec<u8>>,
    completed: VecDeque<DiskCompletion>,
}

impl MemDiskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl DiskStore for MemDiskStore {
    fn put_data(&mut self, slot: u64, data: &Data) {
        self.slots.insert(slot, data.encode());
    }

    fn get_data(&mut self, request: DiskRead) {
        let result = match self.slots.get(&request.slot) {
            Some(bytes) => decode_slot(request.slot, bytes),
            None => Err(DiskError::EmptySlot(request.slot)),
        };
        self.completed.push_back(DiskCompletion { request, result });
    }

    fn poll(&mut self, out: &mut Vec<DiskCompletion>) {
        out.extend(self.completed.drain(..));
    }
}

enum DiskOp {
    Put { slot: u64, bytes: Vec<u8> },
    Get(DiskRead),
    Stop,
}

/// Fixed-size slots in one file, served by a worker thread
pub struct FileDiskStore {
    ops: Sender<DiskOp>,
    completions: Receiver<DiskCompletion>,
    failed: Vec<DiskCompletion>,
    worker: Option<thread::JoinHandle<()>>,
}

impl FileDiskStore {
    pub fn open<P: AsRef<Path>>(path: P, n_slots: u64, slot_size: usize) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("opening disk store {}", path.display()))?;
        file.set_len((n_slots + 1) * slot_size as u64)
            .with_context(|| format!("sizing disk store {}", path.display()))?;

        let (ops, ops_rx) = unbounded();
        let (done_tx, completions) = unbounded();
        let mut worker = FileWorker {
            file,
            n_slots,
            slot_size,
        };
        let handle = thread::Builder::new()
            .name("udcn-disk".to_string())
            .spawn(move || worker.run(ops_rx, done_tx))
            .context("spawning disk worker")?;

        info!(
            "Disk store {} opened: {} slots of {} octets",
            path.display(),
            n_slots,
            slot_size
        );
        Ok(Self {
            ops,
            completions,
            failed: Vec::new(),
            worker: Some(handle),
        })
    }
}

impl DiskStore for FileDiskStore {
    fn put_data(&mut self, slot: u64, data: &Data) {
        if self.ops.send(DiskOp::Put { slot, bytes: data.encode() }).is_err() {
            warn!("Disk worker stopped, dropping write to slot {}", slot);
        }
    }

    fn get_data(&mut self, request: DiskRead) {
        if let Err(err) = self.ops.send(DiskOp::Get(request)) {
            if let DiskOp::Get(request) = err.into_inner() {
                warn!("Disk worker stopped, failing read of slot {}", request.slot);
                self.failed.push(DiskCompletion {
                    request,
                    result: Err(DiskError::Closed),
                });
            }
        }
    }

    fn poll(&mut self, out: &mut Vec<DiskCompletion>) {
        out.append(&mut self.failed);
        out.extend(self.completions.try_iter());
    }
}

impl Drop for FileDiskStore {
    fn drop(&mut self) {
        let _ = self.ops.send(DiskOp::Stop);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct FileWorker {
    file: File,
    n_slots: u64,
    slot_size: usize,
}

impl FileWorker {
    fn run(&mut self, ops: Receiver<DiskOp>, done: Sender<DiskCompletion>) {
        for op in ops.iter() {
            match op {
                DiskOp::Put { slot, bytes } => {
                    if let Err(e) = self.write_slot(slot, &bytes) {
                        warn!("Disk write to slot {} failed: {}", slot, e);
                    }
                }
                DiskOp::Get(request) => {
                    let result = self.read_slot(request.slot);
                    if done.send(DiskCompletion { request, result }).is_err() {
                        break;
                    }
                }
                DiskOp::Stop => break,
            }
        }
    }

    fn offset(&self, slot: u64) -> Result<u64, DiskError> {
        if slot == DISK_SLOT_INVALID || slot > self.n_slots {
            return Err(DiskError::InvalidSlot(slot));
        }
        Ok(slot * self.slot_size as u64)
    }

    fn write_slot(&mut self, slot: u64, bytes: &[u8]) -> Result<(), DiskError> {
        let offset = self.offset(slot)?;
        let max = self.slot_size - SLOT_HEADER_LEN;
        self.file.seek(SeekFrom::Start(offset))?;
        if bytes.len() > max {
            // leave the slot empty so that a later read fails cleanly
            self.file.write_all(&0u32.to_be_bytes())?;
            return Err(DiskError::TooLarge {
                size: bytes.len(),
                slot_size: self.slot_size,
            });
        }
        self.file.write_all(&(bytes.len() as u32).to_be_bytes())?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn read_slot(&mut self, slot: u64) -> Result<Data, DiskError> {
        let offset = self.offset(slot)?;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; SLOT_HEADER_LEN];
        self.file.read_exact(&mut header)?;
        let len = u32::from_be_bytes(header) as usize;
        if len > self.slot_size - SLOT_HEADER_LEN {
            return Err(DiskError::EmptySlot(slot));
        }
        let mut bytes = vec![0u8; len];
        self.file.read_exact(&mut bytes)?;
        decode_slot(slot, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use std::time::{Duration, Instant};
    use udcn_core::{Interest, Name};

    fn data(uri: &str) -> Data {
        Data::new(Name::from_uri(uri).unwrap(), "payload").with_freshness_period(Duration::from_secs(1))
    }

    fn read(slot: u64) -> DiskRead {
        let interest = Interest::new(Name::from_uri("/a").unwrap());
        DiskRead {
            direct: Arena::new(1).alloc(()).unwrap(),
            slot,
            interest: Packet::interest(1, interest),
        }
    }

    fn wait_for(store: &mut dyn DiskStore, n: usize) -> Vec<DiskCompletion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.len() < n && Instant::now() < deadline {
            store.poll(&mut out);
            thread::sleep(Duration::from_millis(1));
        }
        out
    }

    #[test]
    fn test_tier_never_allocates_slot_zero() {
        let mut tier = DiskTier::new(Box::new(MemDiskStore::new()), 3);
        let slots: Vec<u64> = std::iter::from_fn(|| tier.alloc_slot()).collect();
        assert_eq!(slots, vec![1, 2, 3]);
        assert_eq!(tier.alloc_slot(), None);
        tier.free_slot(2);
        assert_eq!(tier.alloc_slot(), Some(2));
    }

    #[test]
    fn test_mem_store_round_trip() {
        let mut store = MemDiskStore::new();
        store.put_data(4, &data("/a/b"));
        store.get_data(read(4));
        store.get_data(read(5));

        let mut out = Vec::new();
        store.poll(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].result.as_ref().unwrap().name, Name::from_uri("/a/b").unwrap());
        assert!(matches!(out[1].result, Err(DiskError::EmptySlot(5))));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileDiskStore::open(dir.path().join("cs.slots"), 8, 512).unwrap();
        store.put_data(3, &data("/x/y"));
        store.get_data(read(3));

        let out = wait_for(&mut store, 1);
        assert_eq!(out.len(), 1);
        let got = out[0].result.as_ref().unwrap();
        assert_eq!(got.name, Name::from_uri("/x/y").unwrap());
        assert_eq!(&got.content[..], b"payload");
        assert_eq!(out[0].request.slot, 3);
    }

    #[test]
    fn test_file_store_rejects_bad_slots() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileDiskStore::open(dir.path().join("cs.slots"), 2, 128).unwrap();
        store.put_data(1, &Data::new(Name::from_uri("/big").unwrap(), vec![0u8; 500]));
        store.get_data(read(1));
        store.get_data(read(0));
        store.get_data(read(2));

        let out = wait_for(&mut store, 3);
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0].result, Err(DiskError::EmptySlot(1))));
        assert!(matches!(out[1].result, Err(DiskError::InvalidSlot(0))));
        assert!(matches!(out[2].result, Err(DiskError::EmptySlot(2))));
    }
}
