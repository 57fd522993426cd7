//! The simulated clock and its event queue.
//!
//! There is a single `now`, advanced only by popping the earliest scheduled
//! event off a min-heap keyed on `(time, sequence)`. The sequence number
//! (a globally monotonic counter) breaks ties between events scheduled at
//! the same instant in insertion order, per spec §4.1/§5(i).

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use ordered_float::OrderedFloat;

use crate::process::ProcessId;

/// A pending resumption: process `pid` should run at simulated time `at`.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledEvent {
    pub at: OrderedFloat<f64>,
    pub seq: u64,
    pub pid: ProcessId,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    /// Reversed so a `BinaryHeap` (a max-heap) pops the *smallest* `(at, seq)`
    /// first, i.e. behaves as a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending events plus the monotonic sequence counter used to
/// order same-instant events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `pid` to resume at time `at`, returning the sequence number
    /// assigned to this event.
    pub fn schedule(&mut self, at: f64, pid: ProcessId) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduledEvent {
            at: OrderedFloat(at),
            seq,
            pid,
        });
        seq
    }

    /// Pop the earliest event, if any.
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    /// Peek the time of the earliest event without removing it.
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.at.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// The simulated clock: just `now`, in hours, with no wall-clock relation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    now: f64,
}

impl Clock {
    pub fn new() -> Self {
        Self { now: 0.0 }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Advance `now` to `at`. Simulated time never moves backwards.
    pub fn advance_to(&mut self, at: f64) {
        debug_assert!(
            at + 1e-9 >= self.now,
            "clock moved backwards: {} -> {}",
            self.now,
            at
        );
        self.now = at;
    }
}

/// A read-only handle onto the scheduler's current time, shared with every
/// running process so stage code can timestamp `Monitor` writes (WIP,
/// queue-length) without round-tripping through a suspend/resume just to
/// learn `now` — time itself only ever advances in the kernel's dispatch
/// loop (spec §4.1), this is purely a read path.
#[derive(Debug, Clone)]
pub struct SimClock(Rc<Cell<f64>>);

impl SimClock {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(0.0)))
    }

    pub fn now(&self) -> f64 {
        self.0.get()
    }

    pub(crate) fn set(&self, t: f64) {
        self.0.set(t);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u64) -> ProcessId {
        ProcessId::from_raw(n)
    }

    #[test]
    fn pops_in_time_order() {
        let mut q = EventQueue::new();
        q.schedule(5.0, pid(1));
        q.schedule(1.0, pid(2));
        q.schedule(3.0, pid(3));
        let order: Vec<_> = std::iter::from_fn(|| q.pop()).map(|e| e.pid).collect();
        assert_eq!(order, vec![pid(2), pid(3), pid(1)]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut q = EventQueue::new();
        q.schedule(2.0, pid(1));
        q.schedule(2.0, pid(2));
        q.schedule(2.0, pid(3));
        let order: Vec<_> = std::iter::from_fn(|| q.pop()).map(|e| e.pid).collect();
        assert_eq!(order, vec![pid(1), pid(2), pid(3)]);
    }

    #[test]
    fn clock_advances_monotonically() {
        let mut c = Clock::new();
        c.advance_to(1.5);
        assert_eq!(c.now(), 1.5);
        c.advance_to(3.0);
        assert_eq!(c.now(), 3.0);
    }
}
