//! Implicit digest computation for Data answering digest-named Interests.

use std::thread;

use anyhow::Context;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info};
use udcn_core::{Packet, L3};

/// A Data packet handed back with its digest computed, or returned as is if
/// the helper could not process it.
#[derive(Debug)]
pub struct DigestCompletion {
    pub packet: Packet,
    pub ok: bool,
}

pub trait DigestHelper: Send {
    /// Queue a Data packet; false if the queue is full
    fn enqueue(&mut self, packet: Packet) -> bool;

    fn poll(&mut self, out: &mut Vec<DigestCompletion>);
}

fn digest_packet(mut packet: Packet) -> DigestCompletion {
    let ok = match &mut packet.l3 {
        L3::Data(data) => {
            data.compute_digest();
            true
        }
        _ => false,
    };
    DigestCompletion { packet, ok }
}

/// Computes digests on the forwarding thread, at the next poll
#[derive(Default)]
pub struct InlineDigest {
    pending: Vec<Packet>,
}

impl InlineDigest {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DigestHelper for InlineDigest {
    fn enqueue(&mut self, packet: Packet) -> bool {
        self.pending.push(packet);
        true
    }

    fn poll(&mut self, out: &mut Vec<DigestCompletion>) {
        out.extend(self.pending.drain(..).map(digest_packet));
    }
}

/// Computes digests on a worker thread
pub struct ThreadedDigest {
    requests: Option<Sender<Packet>>,
    replies: Receiver<DigestCompletion>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ThreadedDigest {
    pub fn spawn(queue_capacity: usize) -> anyhow::Result<Self> {
        let (requests, request_rx) = bounded::<Packet>(queue_capacity);
        let (reply_tx, replies) = unbounded();
        let worker = thread::Builder::new()
            .name("udcn-digest".to_string())
            .spawn(move || {
                for packet in request_rx.iter() {
                    if reply_tx.send(digest_packet(packet)).is_err() {
                        break;
                    }
                }
                debug!("Digest worker exiting");
            })
            .context("spawning digest worker")?;
        info!("Digest worker started, queue capacity {}", queue_capacity);
        Ok(Self {
            requests: Some(requests),
            replies,
            worker: Some(worker),
        })
    }
}

impl DigestHelper for ThreadedDigest {
    fn enqueue(&mut self, packet: Packet) -> bool {
        self.requests.as_ref().is_some_and(|tx| tx.try_send(packet).is_ok())
    }

    fn poll(&mut self, out: &mut Vec<DigestCompletion>) {
        out.extend(self.replies.try_iter());
    }
}

impl Drop for ThreadedDigest {
    fn drop(&mut self) {
        // closing the request channel ends the worker loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use udcn_core::{Data, Interest, Name};

    fn data_packet() -> Packet {
        Packet::data(3, Data::new(Name::from_uri("/d").unwrap(), "content"), Some(9))
    }

    #[test]
    fn test_inline_digest() {
        let mut helper = InlineDigest::new();
        assert!(helper.enqueue(data_packet()));
        let mut out = Vec::new();
        helper.poll(&mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].ok);
        let L3::Data(data) = &out[0].packet.l3 else {
            panic!("expected Data");
        };
        assert!(data.digest().is_some());
        assert_eq!(out[0].packet.lp.pit_token, Some(9));
    }

    #[test]
    fn test_non_data_is_returned_unprocessed() {
        let mut helper = InlineDigest::new();
        helper.enqueue(Packet::interest(1, Interest::new(Name::from_uri("/i").unwrap())));
        let mut out = Vec::new();
        helper.poll(&mut out);
        assert!(!out[0].ok);
    }

    #[test]
    fn test_threaded_digest() {
        let mut helper = ThreadedDigest::spawn(4).unwrap();
        let mut expected = data_packet();
        let L3::Data(data) = &mut expected.l3 else {
            unreachable!();
        };
        let digest = data.compute_digest();

        assert!(helper.enqueue(data_packet()));
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.is_empty() && Instant::now() < deadline {
            helper.poll(&mut out);
            thread::sleep(Duration::from_millis(1));
        }
        let L3::Data(got) = &out[0].packet.l3 else {
            panic!("expected Data");
        };
        assert_eq!(got.digest(), Some(&digest));
    }
}
