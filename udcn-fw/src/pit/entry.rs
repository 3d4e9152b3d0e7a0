use std::collections::VecDeque;

use udcn_common::{FaceId, NackReason, PIT_SG_SCRATCH};
use udcn_core::{Interest, Name};

use crate::arena::ExtPool;
use crate::clock::{Time, duration_ns};
use crate::config::PitConfig;
use crate::fib::FibRef;
use crate::strategy::StrategyId;
use crate::timer::TimerId;

/// Inline record slots, then extension blocks drawn from the shared pool
#[derive(Debug, Clone)]
pub(crate) struct RecordList<T> {
    items: Vec<T>,
    ext_blocks: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordLimits {
    pub inline: usize,
    pub per_ext: usize,
    pub max_ext_hops: usize,
}

impl<T> RecordList<T> {
    pub fn new(inline: usize) -> Self {
        Self {
            items: Vec::with_capacity(inline),
            ext_blocks: 0,
        }
    }

    pub fn push(&mut self, item: T, limits: RecordLimits, ext: &mut ExtPool) -> Option<usize> {
        let capacity = limits.inline + self.ext_blocks * limits.per_ext;
        if self.items.len() >= capacity {
            if self.ext_blocks >= limits.max_ext_hops || !ext.take(1) {
                return None;
            }
            self.ext_blocks += 1;
        }
        self.items.push(item);
        Some(self.items.len() - 1)
    }

    pub fn ext_blocks(&self) -> usize {
        self.ext_blocks
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }
}

/// Downstream record: one per face the Interest arrived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitDn {
    pub face: FaceId,
    /// Arrival time plus the Interest lifetime
    pub expiry: Time,
    /// PIT token of the downstream, echoed on Data and Nacks sent back
    pub token: Option<u64>,
    pub nonce: u32,
    /// Congestion mark of the Interest, echoed on the reply
    pub cong_mark: u8,
    /// Whether this downstream accepts Data with a longer name
    pub can_be_prefix: bool,
}

impl PitDn {
    /// Whether Data named `data_name` answers this downstream of an entry
    /// for `interest_name`
    pub fn accepts(&self, interest_name: &Name, data_name: &Name) -> bool {
        self.can_be_prefix || data_name.len() <= interest_name.len()
    }
}

/// Upstream record: one per nexthop the Interest was forwarded to
#[derive(Debug, Clone)]
pub struct PitUp {
    face: FaceId,
    /// Nonce of the last transmission
    nonce: u32,
    /// Nonces this upstream answered with Nack~Duplicate, oldest first
    rejected: VecDeque<u32>,
    /// Most `rejected` nonces remembered
    rejected_cap: usize,
    /// Time of the last transmission, 0 if never sent
    last_tx: Time,
    /// Retransmission suppression interval in nanoseconds
    suppress: u64,
    /// Transmissions to this upstream
    n_tx: u32,
    /// Nack received since the last transmission
    nack: Option<NackReason>,
}

impl PitUp {
    pub(crate) fn new(face: FaceId, rejected_cap: usize) -> Self {
        Self {
            face,
            nonce: 0,
            rejected: VecDeque::with_capacity(rejected_cap),
            rejected_cap,
            last_tx: 0,
            suppress: 0,
            n_tx: 0,
            nack: None,
        }
    }

    pub fn face(&self) -> FaceId {
        self.face
    }

    /// Nonce of the last transmission
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn last_tx(&self) -> Time {
        self.last_tx
    }

    pub fn n_tx(&self) -> u32 {
        self.n_tx
    }

    /// Current retransmission suppression interval, in nanoseconds
    pub fn suppress(&self) -> u64 {
        self.suppress
    }

    pub fn nack(&self) -> Option<NackReason> {
        self.nack
    }

    pub(crate) fn set_nack(&mut self, reason: NackReason) {
        self.nack = Some(reason);
    }

    pub fn has_rejected_nonce(&self, nonce: u32) -> bool {
        self.rejected.contains(&nonce)
    }

    pub(crate) fn add_rejected_nonce(&mut self, nonce: u32) {
        if self.has_rejected_nonce(nonce) {
            return;
        }
        if self.rejected.len() >= self.rejected_cap {
            self.rejected.pop_front();
        }
        self.rejected.push_back(nonce);
    }

    pub fn should_suppress(&self, now: Time) -> bool {
        self.last_tx != 0 && self.last_tx + self.suppress > now
    }

    pub(crate) fn record_tx(&mut self, now: Time, nonce: u32, cfg: &PitConfig) {
        let min = duration_ns(std::time::Duration::from_millis(cfg.suppress_min_ms));
        let max = duration_ns(std::time::Duration::from_millis(cfg.suppress_max_ms));
        self.suppress = if self.last_tx == 0 {
            min
        } else {
            ((self.suppress as f64 * cfg.suppress_multiplier) as u64).clamp(min, max)
        };
        self.last_tx = now;
        self.nonce = nonce;
        self.n_tx += 1;
        self.nack = None;
    }
}

/// Pending Interest state for one (name, forwarding hint, MustBeFresh)
pub struct PitEntry {
    /// Most recently received Interest
    interest: Interest,
    /// Latest downstream expiry
    expiry: Time,
    /// FIB entry the Interest was forwarded by
    fib_ref: Option<FibRef>,
    dns: RecordList<PitDn>,
    ups: RecordList<PitUp>,
    sg_scratch: [u8; PIT_SG_SCRATCH],
    /// Strategy owning `sg_scratch`; a different strategy starts from zeroes
    sg_id: Option<StrategyId>,
    pub(crate) timer: Option<TimerId>,
    pub(crate) has_sg_timer: bool,
}

impl PitEntry {
    pub(crate) fn new(interest: Interest, fib_ref: Option<FibRef>, cfg: &PitConfig) -> Self {
        Self {
            interest,
            expiry: 0,
            fib_ref,
            dns: RecordList::new(cfg.dn_inline),
            ups: RecordList::new(cfg.up_inline),
            sg_scratch: [0; PIT_SG_SCRATCH],
            sg_id: None,
            timer: None,
            has_sg_timer: false,
        }
    }

    /// Representative Interest: the most recently received one
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub(crate) fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    pub fn expiry(&self) -> Time {
        self.expiry
    }

    pub(crate) fn refresh_expiry(&mut self) {
        self.expiry = self.dns.as_slice().iter().map(|dn| dn.expiry).max().unwrap_or(0);
    }

    pub fn fib_ref(&self) -> Option<&FibRef> {
        self.fib_ref.as_ref()
    }

    pub(crate) fn set_fib_ref(&mut self, fib_ref: Option<FibRef>) {
        self.fib_ref = fib_ref;
    }

    pub fn dns(&self) -> &[PitDn] {
        self.dns.as_slice()
    }

    /// Whether any downstream accepts Data with a longer name
    pub fn can_be_prefix(&self) -> bool {
        self.interest.can_be_prefix || self.dns().iter().any(|dn| dn.can_be_prefix)
    }

    pub fn ups(&self) -> &[PitUp] {
        self.ups.as_slice()
    }

    pub(crate) fn dns_mut(&mut self) -> &mut RecordList<PitDn> {
        &mut self.dns
    }

    pub(crate) fn ups_mut(&mut self) -> &mut RecordList<PitUp> {
        &mut self.ups
    }

    pub(crate) fn ext_blocks(&self) -> usize {
        self.dns.ext_blocks() + self.ups.ext_blocks()
    }

    pub fn has_sg_timer(&self) -> bool {
        self.has_sg_timer
    }

    pub fn find_up(&self, face: FaceId) -> Option<usize> {
        self.ups().iter().position(|up| up.face == face)
    }

    /// Face of another downstream that used `nonce`
    pub fn find_duplicate_nonce(&self, nonce: u32, rx_face: FaceId) -> Option<FaceId> {
        self.dns()
            .iter()
            .find(|dn| dn.face != rx_face && dn.nonce == nonce)
            .map(|dn| dn.face)
    }

    /// Nonce for transmitting to upstream `up`: the representative Interest's
    /// nonce unless that upstream rejected it, otherwise the nonce of a live
    /// downstream not rejected by it.
    pub fn choose_nonce(&self, up: usize, now: Time) -> Option<u32> {
        let up = self.ups().get(up)?;
        if !up.has_rejected_nonce(self.interest.nonce) {
            return Some(self.interest.nonce);
        }
        self.dns()
            .iter()
            .filter(|dn| dn.expiry >= now)
            .map(|dn| dn.nonce)
            .find(|nonce| !up.has_rejected_nonce(*nonce))
    }

    /// Strategy scratch area, cleared when a different strategy takes over
    pub(crate) fn sg_scratch_for(&mut self, strategy: StrategyId) -> &mut [u8; PIT_SG_SCRATCH] {
        if self.sg_id != Some(strategy) {
            self.sg_scratch = [0; PIT_SG_SCRATCH];
            self.sg_id = Some(strategy);
        }
        &mut self.sg_scratch
    }

    pub fn sg_scratch(&self) -> &[u8; PIT_SG_SCRATCH] {
        &self.sg_scratch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udcn_core::Name;

    const MS: u64 = 1_000_000;

    fn up_with_rejected(nonces: &[u32]) -> PitUp {
        let mut up = PitUp::new(9, 3);
        for n in nonces {
            up.add_rejected_nonce(*n);
        }
        up
    }

    #[test]
    fn test_rejected_nonce_ring() {
        let up = up_with_rejected(&[1, 2, 3, 4]);
        assert!(!up.has_rejected_nonce(1));
        assert!(up.has_rejected_nonce(2));
        assert!(up.has_rejected_nonce(4));
    }

    #[test]
    fn test_suppression_grows_to_cap() {
        let cfg = PitConfig::default();
        let mut up = PitUp::new(1, 6);
        assert!(!up.should_suppress(5));

        up.record_tx(100 * MS, 1, &cfg);
        assert_eq!(up.suppress(), 10 * MS);
        assert!(up.should_suppress(105 * MS));
        assert!(!up.should_suppress(110 * MS));

        let mut now = 100 * MS;
        for _ in 0..10 {
            now += 200 * MS;
            up.record_tx(now, 1, &cfg);
        }
        assert_eq!(up.suppress(), 100 * MS);
        assert_eq!(up.n_tx(), 11);
    }

    #[test]
    fn test_record_tx_clears_nack() {
        let cfg = PitConfig::default();
        let mut up = PitUp::new(1, 6);
        up.set_nack(NackReason::Congestion);
        up.record_tx(1, 7, &cfg);
        assert_eq!(up.nack(), None);
        assert_eq!(up.nonce(), 7);
    }

    #[test]
    fn test_record_list_ext_limits() {
        let limits = RecordLimits {
            inline: 2,
            per_ext: 2,
            max_ext_hops: 1,
        };
        let mut ext = ExtPool::new(10);
        let mut list = RecordList::new(2);
        for i in 0..4 {
            assert_eq!(list.push(i, limits, &mut ext), Some(i));
        }
        assert_eq!(list.push(4, limits, &mut ext), None);
        assert_eq!(list.ext_blocks(), 1);
        assert_eq!(ext.used(), 1);
    }

    #[test]
    fn test_choose_nonce_avoids_rejected() {
        let cfg = PitConfig::default();
        let interest = Interest::new(Name::from_uri("/a").unwrap()).with_nonce(0xAAAA);
        let mut entry = PitEntry::new(interest, None, &cfg);
        let mut ext = ExtPool::new(0);
        let limits = RecordLimits {
            inline: 4,
            per_ext: 1,
            max_ext_hops: 0,
        };
        for (face, nonce, expiry) in [(1, 0xAAAA, 50 * MS), (2, 0xBBBB, 5 * MS), (3, 0xCCCC, 50 * MS)] {
            entry.dns_mut().push(
                PitDn {
                    face,
                    expiry,
                    token: None,
                    nonce,
                    cong_mark: 0,
                    can_be_prefix: false,
                },
                limits,
                &mut ext,
            );
        }
        let up = entry.ups_mut().push(PitUp::new(8, 6), limits, &mut ext).unwrap();
        assert_eq!(entry.choose_nonce(up, 10 * MS), Some(0xAAAA));

        entry.ups_mut().as_mut_slice()[up].add_rejected_nonce(0xAAAA);
        // 0xBBBB belongs to an expired downstream
        assert_eq!(entry.choose_nonce(up, 10 * MS), Some(0xCCCC));

        entry.ups_mut().as_mut_slice()[up].add_rejected_nonce(0xCCCC);
        assert_eq!(entry.choose_nonce(up, 10 * MS), None);
    }

    #[test]
    fn test_duplicate_nonce_from_other_face() {
        let cfg = PitConfig::default();
        let mut entry = PitEntry::new(Interest::new(Name::new()), None, &cfg);
        let mut ext = ExtPool::new(0);
        let limits = RecordLimits {
            inline: 4,
            per_ext: 1,
            max_ext_hops: 0,
        };
        entry.dns_mut().push(
            PitDn {
                face: 1,
                expiry: 1,
                token: None,
                nonce: 42,
                cong_mark: 0,
                can_be_prefix: false,
            },
            limits,
            &mut ext,
        );
        assert_eq!(entry.find_duplicate_nonce(42, 2), Some(1));
        assert_eq!(entry.find_duplicate_nonce(42, 1), None);
        assert_eq!(entry.find_duplicate_nonce(43, 2), None);
    }

    #[test]
    fn test_scratch_cleared_on_strategy_change() {
        let cfg = PitConfig::default();
        let mut entry = PitEntry::new(Interest::new(Name::new()), None, &cfg);
        entry.sg_scratch_for(1)[0] = 5;
        assert_eq!(entry.sg_scratch_for(1)[0], 5);
        assert_eq!(entry.sg_scratch_for(2)[0], 0);
    }
}
