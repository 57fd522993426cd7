//! Typed queue (store) abstraction (spec §3 "Store", §4.2 `from_store` /
//! `enter` / `enter_sorted`).
//!
//! A [`Store<T>`] is FIFO unless an item is inserted with
//! [`Store::push_sorted`], in which case it is placed before the first
//! existing item with a strictly less urgent priority; ties keep insertion
//! order. [`Store`]s also hold the FIFO queue of processes blocked in
//! `from_store` on an empty store, so [`crate::scheduler::Scheduler`] can
//! hand an item straight to the longest-waiting process instead of leaving
//! it in the queue.

use std::any::Any;
use std::collections::VecDeque;

use crate::priority::{Priority, PrioritySeq};
use crate::process::ProcessId;

/// Identifies a [`Store`] registered with a [`crate::scheduler::Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u32);

impl StoreId {
    pub fn from_raw(n: u32) -> Self {
        StoreId(n)
    }

    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// A typed FIFO/priority queue of entities.
pub struct Store<T> {
    pub name: String,
    items: VecDeque<(PrioritySeq, T)>,
    /// Processes blocked in `from_store` on this (empty) store, FIFO.
    waiters: VecDeque<ProcessId>,
    next_seq: u64,
}

impl<T> Store<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: VecDeque::new(),
            waiters: VecDeque::new(),
            next_seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let s = self.next_seq;
        self.next_seq += 1;
        s
    }

    /// FIFO append, ignoring priority ordering of existing items.
    pub fn push_back(&mut self, item: T) {
        let seq = self.next_seq();
        self.items.push_back((
            PrioritySeq {
                priority: Priority::Routine,
                seq,
            },
            item,
        ));
    }

    /// Insert ordered by `priority`: before the first existing item with a
    /// strictly less urgent (numerically larger) priority. Ties keep
    /// insertion order (stable).
    pub fn push_sorted(&mut self, item: T, priority: Priority) {
        let seq = self.next_seq();
        let key = PrioritySeq { priority, seq };
        let pos = self
            .items
            .iter()
            .position(|(k, _)| k.priority > priority)
            .unwrap_or(self.items.len());
        self.items.insert(pos, (key, item));
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front().map(|(_, item)| item)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn register_waiter(&mut self, pid: ProcessId) {
        self.waiters.push_back(pid);
    }

    pub fn take_waiter(&mut self) -> Option<ProcessId> {
        self.waiters.pop_front()
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

}

impl<T: Clone> Store<T> {
    /// Every item, in FIFO/priority order, without consuming the store.
    /// Used to read back a store that is only ever appended to (e.g.
    /// `completed_specimens`) once a run ends, mirroring `original_source`'s
    /// `sim.Store.as_list()`.
    pub fn items_cloned(&self) -> Vec<T> {
        self.items.iter().map(|(_, item)| item.clone()).collect()
    }
}

/// Object-safe facade over `Store<T>` so the scheduler can hold a
/// heterogeneous collection of stores keyed by [`StoreId`] without knowing
/// each one's item type. Enter/from_store payloads cross this boundary as
/// `Box<dyn Any>`, downcast immediately by the concrete `Store<T>` impl.
pub trait AnyStore {
    fn push_back_any(&mut self, item: Box<dyn Any>);
    fn push_sorted_any(&mut self, item: Box<dyn Any>, priority: Priority);
    fn pop_front_any(&mut self) -> Option<Box<dyn Any>>;
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
    fn register_waiter(&mut self, pid: ProcessId);
    fn take_waiter(&mut self) -> Option<ProcessId>;
    fn waiter_count(&self) -> usize;
    fn name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> AnyStore for Store<T> {
    fn push_back_any(&mut self, item: Box<dyn Any>) {
        let item = *item
            .downcast::<T>()
            .expect("store item type mismatch on push_back");
        self.push_back(item);
    }

    fn push_sorted_any(&mut self, item: Box<dyn Any>, priority: Priority) {
        let item = *item
            .downcast::<T>()
            .expect("store item type mismatch on push_sorted");
        self.push_sorted(item, priority);
    }

    fn pop_front_any(&mut self) -> Option<Box<dyn Any>> {
        self.pop_front().map(|item| Box::new(item) as Box<dyn Any>)
    }

    fn is_empty(&self) -> bool {
        Store::is_empty(self)
    }

    fn len(&self) -> usize {
        Store::len(self)
    }

    fn register_waiter(&mut self, pid: ProcessId) {
        Store::register_waiter(self, pid)
    }

    fn take_waiter(&mut self) -> Option<ProcessId> {
        Store::take_waiter(self)
    }

    fn waiter_count(&self) -> usize {
        Store::waiter_count(self)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let mut s: Store<i32> = Store::new("test");
        s.push_back(1);
        s.push_back(2);
        s.push_back(3);
        assert_eq!(s.pop_front(), Some(1));
        assert_eq!(s.pop_front(), Some(2));
        assert_eq!(s.pop_front(), Some(3));
    }

    #[test]
    fn sorted_insert_orders_by_priority_then_insertion() {
        let mut s: Store<&str> = Store::new("test");
        s.push_sorted("routine-1", Priority::Routine);
        s.push_sorted("routine-2", Priority::Routine);
        s.push_sorted("urgent", Priority::Urgent);
        s.push_sorted("cancer", Priority::Cancer);
        let order: Vec<_> = std::iter::from_fn(|| s.pop_front()).collect();
        assert_eq!(order, vec!["urgent", "cancer", "routine-1", "routine-2"]);
    }

    #[test]
    fn items_cloned_reads_back_without_consuming() {
        let mut s: Store<i32> = Store::new("test");
        s.push_back(1);
        s.push_back(2);
        assert_eq!(s.items_cloned(), vec![1, 2]);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn waiters_are_fifo() {
        let mut s: Store<i32> = Store::new("test");
        s.register_waiter(ProcessId::from_raw(1));
        s.register_waiter(ProcessId::from_raw(2));
        assert_eq!(s.take_waiter(), Some(ProcessId::from_raw(1)));
        assert_eq!(s.take_waiter(), Some(ProcessId::from_raw(2)));
        assert_eq!(s.take_waiter(), None);
    }
}
