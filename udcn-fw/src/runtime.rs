//! Forwarding threads.
//!
//! `Forwarder` owns one `FwFwd` per core and the `FwInput` feeding them.
//! Starting moves each core onto its own thread; stopping hands the cores
//! back, so a stopped forwarder keeps its tables and can be started again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use log::{error, info};
use udcn_core::Packet;

use crate::config::{FwConfig, InputConfig};
use crate::crypto::ThreadedDigest;
use crate::disk::{FileDiskStore, MemDiskStore};
use crate::error::RuntimeError;
use crate::fwd::{FwDeps, FwFwd, FwFwdStats};
use crate::input::FwInput;

pub struct Forwarder {
    input: Arc<FwInput>,
    stats: Vec<Arc<FwFwdStats>>,
    idle: Vec<FwFwd>,
    workers: Vec<JoinHandle<FwFwd>>,
    stop: Arc<AtomicBool>,
}

impl Forwarder {
    /// Build `fwd.n_cores` forwarding cores, each with a digest worker and,
    /// when `cs.disk_slots` is set, a disk tier.
    pub fn new(config: &FwConfig, deps: &FwDeps) -> anyhow::Result<Self> {
        config.validate()?;
        let mut cores = Vec::with_capacity(config.fwd.n_cores);
        for i in 0..config.fwd.n_cores {
            let id = i as u8;
            let mut fwd = FwFwd::new(id, config, deps);
            fwd.set_digest_helper(Box::new(ThreadedDigest::spawn(config.fwd.input_ring_capacity)?));

            let cs = &config.cs;
            if cs.disk_slots > 0 {
                match &cs.disk_path {
                    Some(prefix) => {
                        let path = format!("{}.{}", prefix, id);
                        let store = FileDiskStore::open(&path, cs.disk_slots, cs.disk_slot_size)
                            .with_context(|| format!("disk tier of forwarding core {}", id))?;
                        fwd.attach_disk(Box::new(store), cs.disk_slots);
                    }
                    None => fwd.attach_disk(Box::new(MemDiskStore::new()), cs.disk_slots),
                }
            }
            cores.push(fwd);
        }
        Ok(Self::from_cores(&config.input, cores))
    }

    /// Wrap cores set up by the caller
    pub fn from_cores(input: &InputConfig, cores: Vec<FwFwd>) -> Self {
        let queues = cores.iter().map(FwFwd::input).collect();
        let stats = cores.iter().map(FwFwd::stats).collect();
        Self {
            input: Arc::new(FwInput::new(input, queues)),
            stats,
            idle: cores,
            workers: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if !self.workers.is_empty() {
            return Err(RuntimeError::AlreadyRunning);
        }
        self.stop.store(false, Ordering::Release);

        for mut fwd in std::mem::take(&mut self.idle) {
            let stop = Arc::clone(&self.stop);
            let id = fwd.id();
            let spawned = thread::Builder::new()
                .name(format!("udcn-fwd-{}", id))
                .spawn(move || {
                    fwd.run(&stop);
                    fwd
                });
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    error!("Cannot spawn forwarding core {}: {}", id, e);
                    self.stop();
                    return Err(RuntimeError::SpawnFailed(e.to_string()));
                }
            }
        }
        info!("Forwarder started with {} cores", self.workers.len());
        Ok(())
    }

    /// Stop all cores and wait for them to finish their current iteration
    pub fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.stop.store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            match handle.join() {
                Ok(fwd) => self.idle.push(fwd),
                Err(_) => error!("Forwarding thread panicked"),
            }
        }
        self.idle.sort_by_key(FwFwd::id);
        info!("Forwarder stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn n_cores(&self) -> usize {
        self.stats.len()
    }

    pub fn input(&self) -> Arc<FwInput> {
        Arc::clone(&self.input)
    }

    pub fn dispatch(&self, pkt: Packet) -> bool {
        self.input.dispatch(pkt)
    }

    pub fn stats(&self, core: usize) -> Option<Arc<FwFwdStats>> {
        self.stats.get(core).cloned()
    }

    /// Cores not currently running
    pub fn idle_cores(&mut self) -> &mut [FwFwd] {
        &mut self.idle
    }

    pub fn stats_json(&self) -> serde_json::Result<String> {
        let cores: Vec<_> = self.stats.iter().map(|s| s.to_value()).collect();
        let json = serde_json::json!({
            "input": self.input.counters(),
            "cores": cores,
        });
        serde_json::to_string_pretty(&json)
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use udcn_core::{Data, Interest, Name, L3};

    use crate::clock::SystemClock;
    use crate::face::{FaceTable, FaceTx};
    use crate::fib::Fib;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn wait_for(faces: &FaceTable, face: u16) -> Packet {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(pkt) = faces.pop(face) {
                return pkt;
            }
            assert!(Instant::now() < deadline, "nothing sent on face {}", face);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn setup(n_cores: usize) -> (Forwarder, Arc<FaceTable>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let faces = Arc::new(FaceTable::new());
        for face in 1..=3 {
            faces.add(face, 64).unwrap();
        }
        let fib = Arc::new(Fib::new());
        fib.insert(name("/a"), vec![3], 0).unwrap();
        let faces_tx: Arc<dyn FaceTx> = faces.clone();
        let deps = FwDeps::new(fib, faces_tx, Arc::new(SystemClock::new()));

        let mut config = FwConfig::default();
        config.pcct.capacity = 1024;
        config.pcct.key_ext_capacity = 64;
        config.input.ndt_bits = 4;
        config.fwd.n_cores = n_cores;
        config.fwd.input_ring_capacity = 64;
        (Forwarder::new(&config, &deps).unwrap(), faces)
    }

    #[test]
    fn test_round_trip_through_threads() {
        let (mut fw, faces) = setup(2);
        fw.start().unwrap();
        assert!(fw.is_running());
        assert!(matches!(fw.start(), Err(RuntimeError::AlreadyRunning)));

        assert!(fw.dispatch(Packet::interest(1, Interest::new(name("/a/b")).with_nonce(1))));
        let up = wait_for(&faces, 3);
        let token = up.lp.pit_token.unwrap();

        let data = Data::new(name("/a/b"), "payload").with_freshness_period(Duration::from_secs(1));
        assert!(fw.dispatch(Packet::data(3, data, Some(token))));
        let down = wait_for(&faces, 1);
        assert!(matches!(&down.l3, L3::Data(d) if d.name == name("/a/b")));

        fw.stop();
        assert!(!fw.is_running());
        let n_rx: u64 = (0..fw.n_cores())
            .map(|i| fw.stats(i).unwrap().counters.snapshot().n_interest_rx)
            .sum();
        assert_eq!(n_rx, 1);
        assert_eq!(fw.input().counters().n_token_routed, 1);
    }

    #[test]
    fn test_restart_keeps_tables() {
        let (mut fw, faces) = setup(1);
        fw.start().unwrap();
        fw.dispatch(Packet::interest(1, Interest::new(name("/a/b")).with_nonce(1)));
        let up = wait_for(&faces, 3);
        fw.stop();
        assert_eq!(fw.idle_cores()[0].pcct().len(), 1);

        fw.start().unwrap();
        let data = Data::new(name("/a/b"), "payload");
        fw.dispatch(Packet::data(3, data, up.lp.pit_token));
        wait_for(&faces, 1);
        drop(fw);
    }

    #[test]
    fn test_stats_json() {
        let (fw, _faces) = setup(2);
        let json: serde_json::Value = serde_json::from_str(&fw.stats_json().unwrap()).unwrap();
        assert_eq!(json["cores"].as_array().unwrap().len(), 2);
        assert_eq!(json["input"]["n_accepted"], serde_json::json!([0, 0]));
    }
}
