//! Hashed timer wheel polled once per forwarding loop iteration.

use std::time::Duration;

use crate::clock::{duration_ns, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct TimerItem<T> {
    id: TimerId,
    deadline: Time,
    payload: T,
}

/// Timers are never cancelled in place: owners keep the `TimerId` they
/// armed last and ignore firings of any other id.
pub struct TimerWheel<T> {
    slots: Vec<Vec<TimerItem<T>>>,
    slot_ns: u64,
    next_tick: u64,
    next_id: u64,
    len: usize,
}

impl<T> TimerWheel<T> {
    /// `range` is the longest timer expected; longer ones still fire, after
    /// extra revolutions.
    pub fn new(slot: Duration, range: Duration, now: Time) -> Self {
        let slot_ns = duration_ns(slot).max(1);
        let n_slots = ((duration_ns(range) / slot_ns) as usize + 2).next_power_of_two();
        Self {
            slots: (0..n_slots).map(|_| Vec::new()).collect(),
            slot_ns,
            next_tick: now / slot_ns,
            next_id: 1,
            len: 0,
        }
    }

    fn slot_of(&self, tick: u64) -> usize {
        (tick as usize) & (self.slots.len() - 1)
    }

    pub fn schedule(&mut self, deadline: Time, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let tick = (deadline / self.slot_ns).max(self.next_tick);
        let slot = self.slot_of(tick);
        self.slots[slot].push(TimerItem { id, deadline, payload });
        self.len += 1;
        id
    }

    /// Move every timer with `deadline <= now` into `out`
    pub fn trigger(&mut self, now: Time, out: &mut Vec<(TimerId, T)>) {
        let now_tick = now / self.slot_ns;
        if now_tick < self.next_tick {
            return;
        }
        let steps = ((now_tick - self.next_tick) as usize + 1).min(self.slots.len());
        for step in 0..steps {
            let slot = self.slot_of(self.next_tick + step as u64);
            let items = std::mem::take(&mut self.slots[slot]);
            for item in items {
                if item.deadline <= now {
                    self.len -= 1;
                    out.push((item.id, item.payload));
                } else {
                    self.slots[slot].push(item);
                }
            }
        }
        // the current tick stays open for timers later within it
        self.next_tick = now_tick;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn wheel() -> TimerWheel<&'static str> {
        TimerWheel::new(Duration::from_millis(1), Duration::from_millis(100), 0)
    }

    #[test]
    fn test_fires_at_deadline() {
        let mut w = wheel();
        let a = w.schedule(5 * MS, "a");
        w.schedule(10 * MS, "b");
        let mut out = Vec::new();
        w.trigger(4 * MS, &mut out);
        assert!(out.is_empty());
        w.trigger(5 * MS, &mut out);
        assert_eq!(out, vec![(a, "a")]);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_sub_slot_deadline_not_skipped() {
        let mut w = wheel();
        w.schedule(5 * MS + 500_000, "late");
        let mut out = Vec::new();
        w.trigger(5 * MS + 100, &mut out);
        assert!(out.is_empty());
        w.trigger(5 * MS + 600_000, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_beyond_range_fires_after_revolutions() {
        let mut w = wheel();
        w.schedule(1000 * MS, "far");
        let mut out = Vec::new();
        for t in (0..1000).step_by(7) {
            w.trigger(t * MS, &mut out);
        }
        assert!(out.is_empty());
        w.trigger(1000 * MS, &mut out);
        assert_eq!(out.len(), 1);
        assert!(w.is_empty());
    }

    #[test]
    fn test_past_deadline_fires_on_next_trigger() {
        let mut w = wheel();
        let mut out = Vec::new();
        w.trigger(50 * MS, &mut out);
        w.schedule(10 * MS, "past");
        w.trigger(50 * MS, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_large_jump_fires_everything_due() {
        let mut w = wheel();
        for i in 1..=20 {
            w.schedule(i * 3 * MS, "x");
        }
        let mut out = Vec::new();
        w.trigger(10_000 * MS, &mut out);
        assert_eq!(out.len(), 20);
    }
}
