//! The process scheduler: drives the clock/event queue and interprets every
//! [`Suspend`] a running process yields.
//!
//! Unlike `snow-rt`'s M:N scheduler (`crossbeam-deque` work-stealing across
//! OS threads), this scheduler runs every process on the single OS thread
//! that calls [`Scheduler::run`] — spec §5 makes single-dispatch a hard
//! invariant, not a tuning choice, so there is no run queue to steal from
//! and no locking anywhere in this module.

use std::any::Any;
use std::cmp::Ordering;

use hpath_common::error::KernelError;
use rustc_hash::FxHashMap;

use crate::clock::{Clock, EventQueue, SimClock};
use crate::monitor::Monitor;
use crate::priority::Priority;
use crate::process::{Process, ProcessContext, ProcessId, ResourceClaim, Suspend};
use crate::resource::{Resource, ResourceId};
use crate::store::{AnyStore, Store, StoreId};

struct PendingRequest {
    pid: ProcessId,
    priority: Priority,
    seq: u64,
    claims: Vec<ResourceClaim>,
}

/// Owns every resource, store, and process in one simulation run, and the
/// single logical clock driving them all.
pub struct Scheduler {
    clock: Clock,
    clock_handle: SimClock,
    queue: EventQueue,
    processes: FxHashMap<ProcessId, Process>,
    resources: Vec<Resource>,
    /// Per-resource history of how many requests were waiting on it, one
    /// entry per resource in registration order (spec §4.8
    /// `q_length_by_resource`), mirroring `original_source`'s
    /// `resource.requesters().length` monitor.
    queue_monitors: Vec<Monitor>,
    stores: Vec<Box<dyn AnyStore>>,
    pending: Vec<PendingRequest>,
    next_pending_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
            clock_handle: SimClock::new(),
            queue: EventQueue::new(),
            processes: FxHashMap::default(),
            resources: Vec::new(),
            queue_monitors: Vec::new(),
            stores: Vec::new(),
            pending: Vec::new(),
            next_pending_seq: 0,
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    // -- registration --------------------------------------------------

    pub fn register_resource(&mut self, name: impl Into<String>, initial_capacity: i64) -> ResourceId {
        let id = ResourceId::from_raw(self.resources.len() as u32);
        self.resources.push(Resource::new(name, initial_capacity));
        let mut queue_monitor = Monitor::new();
        queue_monitor.record(self.clock.now(), 0.0);
        self.queue_monitors.push(queue_monitor);
        id
    }

    pub fn register_store<T: 'static>(&mut self, name: impl Into<String>) -> StoreId {
        let id = StoreId::from_raw(self.stores.len() as u32);
        self.stores.push(Box::new(Store::<T>::new(name)));
        id
    }

    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.resources[id.as_raw() as usize]
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn store_len(&self, id: StoreId) -> usize {
        self.stores[id.as_raw() as usize].len()
    }

    pub fn store_name(&self, id: StoreId) -> &str {
        self.stores[id.as_raw() as usize].name()
    }

    /// Every item currently in `id`, cloned out in FIFO/priority order,
    /// downcast back to `T`. Intended for reading a store after `run`
    /// returns (spec §4.10 KPI extraction reads `completed_specimens` this
    /// way); panics if `T` doesn't match the type the store was registered
    /// with.
    pub fn store_items<T: Clone + 'static>(&self, id: StoreId) -> Vec<T> {
        self.stores[id.as_raw() as usize]
            .as_any()
            .downcast_ref::<Store<T>>()
            .expect("store item type mismatch on store_items")
            .items_cloned()
    }

    /// Current count of requests waiting (wholly or partly) on `resource`,
    /// used for the queue-length KPI (spec §4.8 `q_length_by_resource`).
    pub fn waiter_count(&self, resource: ResourceId) -> usize {
        self.pending
            .iter()
            .filter(|p| p.claims.iter().any(|c| c.resource == resource))
            .count()
    }

    /// The recorded history of [`Scheduler::waiter_count`] for `resource`,
    /// used to compute `q_length_by_resource` (spec §4.8).
    pub fn queue_monitor(&self, resource: ResourceId) -> &Monitor {
        &self.queue_monitors[resource.as_raw() as usize]
    }

    fn record_queue_monitor(&mut self, claims: &[ResourceClaim]) {
        for c in claims {
            let count = self.waiter_count(c.resource) as f64;
            let now = self.clock.now();
            self.queue_monitors[c.resource.as_raw() as usize].record(now, count);
        }
    }

    /// Set a resource's capacity at the current time, per the capacity
    /// scheduler (spec §4.3.1). Capacity increases may immediately satisfy
    /// queued requests.
    pub fn set_capacity(&mut self, resource: ResourceId, new_capacity: i64) {
        let now = self.clock.now();
        self.resources[resource.as_raw() as usize].set_capacity(now, new_capacity);
        tracing::debug!(resource = %self.resources[resource.as_raw() as usize].name, new_capacity, now, "capacity changed");
        self.wake_pending();
    }

    /// Spawn a new process at the current time.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        body: impl FnOnce(&ProcessContext) + 'static,
    ) -> ProcessId {
        let proc = Process::spawn(name, self.clock_handle.clone(), body);
        let pid = proc.id;
        self.processes.insert(pid, proc);
        self.queue.schedule(self.clock.now(), pid);
        pid
    }

    // -- driving the simulation -----------------------------------------

    /// Run the simulation for `duration` hours from the current time.
    /// Per spec §5, any in-flight processes at the end of the wall are
    /// simply abandoned (not an error).
    pub fn run(&mut self, duration: f64) -> Result<(), KernelError> {
        let end = self.clock.now() + duration;
        loop {
            match self.queue.peek_time() {
                Some(t) if t <= end => {
                    let event = self.queue.pop().expect("peeked event must be poppable");
                    self.clock.advance_to(event.at.into_inner());
                    self.clock_handle.set(self.clock.now());
                    self.dispatch(event.pid)?;
                }
                _ => break,
            }
        }
        if self.clock.now() < end {
            self.clock.advance_to(end);
            self.clock_handle.set(end);
        }
        Ok(())
    }

    /// Drive one process's coroutine until it blocks on time, an
    /// unsatisfiable request, or an empty store, handling every
    /// synchronously-completable suspension (successful request, release,
    /// enter, spawn, non-blocking from_store) inline.
    fn dispatch(&mut self, pid: ProcessId) -> Result<(), KernelError> {
        let Some(mut proc) = self.processes.remove(&pid) else {
            return Ok(());
        };
        loop {
            match proc.resume() {
                None => {
                    // Process body returned; any resources it still held
                    // would be a caller bug (spec requires matching
                    // release), so nothing to reclaim here.
                    return Ok(());
                }
                Some(Suspend::Hold(d)) => {
                    let at = self.clock.now() + d;
                    self.queue.schedule(at, pid);
                    self.processes.insert(pid, proc);
                    return Ok(());
                }
                Some(Suspend::Request { claims, priority }) => {
                    if self.try_claim(&claims) {
                        for c in &claims {
                            *proc.held.entry(c.resource).or_insert(0) += c.amount;
                        }
                        continue;
                    }
                    let seq = self.next_pending_seq;
                    self.next_pending_seq += 1;
                    self.pending.push(PendingRequest { pid, priority, seq, claims: claims.clone() });
                    self.record_queue_monitor(&claims);
                    self.processes.insert(pid, proc);
                    return Ok(());
                }
                Some(Suspend::Release(resource)) => {
                    match resource {
                        Some(rid) => self.release_one(&mut proc, rid)?,
                        None => self.release_all(&mut proc),
                    }
                    self.wake_pending();
                    continue;
                }
                Some(Suspend::FromStore(store_id)) => {
                    let idx = store_id.as_raw() as usize;
                    if let Some(item) = self.stores[idx].pop_front_any() {
                        proc.deliver_from_store(item);
                        continue;
                    }
                    self.stores[idx].register_waiter(pid);
                    self.processes.insert(pid, proc);
                    return Ok(());
                }
                Some(Suspend::Enter { store, item }) => {
                    self.enter_store(store, item, None);
                    continue;
                }
                Some(Suspend::EnterSorted { store, item, priority }) => {
                    self.enter_store(store, item, Some(priority));
                    continue;
                }
                Some(Suspend::Spawn { name, body }) => {
                    self.spawn(name, body);
                    continue;
                }
                Some(Suspend::SetCapacity { resource, capacity }) => {
                    self.set_capacity(resource, capacity);
                    continue;
                }
                Some(Suspend::Fail(err)) => {
                    // `proc` is simply dropped, mirroring how a normally
                    // completed process is never reinserted.
                    return Err(err);
                }
            }
        }
    }

    fn claims_satisfiable(&self, claims: &[ResourceClaim]) -> bool {
        claims.iter().all(|c| {
            self.resources[c.resource.as_raw() as usize].available() >= c.amount as i64
        })
    }

    fn try_claim(&mut self, claims: &[ResourceClaim]) -> bool {
        if !self.claims_satisfiable(claims) {
            return false;
        }
        let now = self.clock.now();
        for c in claims {
            self.resources[c.resource.as_raw() as usize].claim(now, c.amount as i64);
        }
        true
    }

    fn release_one(&mut self, proc: &mut Process, rid: ResourceId) -> Result<(), KernelError> {
        let Some(amount) = proc.held.remove(&rid) else {
            return Err(KernelError::ReleaseUnheld {
                process: proc.name.clone(),
                resource: self.resources[rid.as_raw() as usize].name.clone(),
            });
        };
        self.resources[rid.as_raw() as usize].release(self.clock.now(), amount as i64);
        Ok(())
    }

    fn release_all(&mut self, proc: &mut Process) {
        let held: Vec<_> = proc.held.drain().collect();
        let now = self.clock.now();
        for (rid, amount) in held {
            self.resources[rid.as_raw() as usize].release(now, amount as i64);
        }
    }

    /// Wake the most-urgent, longest-waiting satisfiable pending request
    /// repeatedly until none remain satisfiable (spec §5(ii)/(iv)).
    fn wake_pending(&mut self) {
        loop {
            let mut best: Option<usize> = None;
            for (i, pr) in self.pending.iter().enumerate() {
                if !self.claims_satisfiable(&pr.claims) {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some(b) => {
                        let bpr = &self.pending[b];
                        (pr.priority, pr.seq).cmp(&(bpr.priority, bpr.seq)) == Ordering::Less
                    }
                };
                if better {
                    best = Some(i);
                }
            }
            let Some(idx) = best else { break };
            let pr = self.pending.remove(idx);
            self.record_queue_monitor(&pr.claims);
            self.try_claim(&pr.claims);
            if let Some(proc) = self.processes.get_mut(&pr.pid) {
                for c in &pr.claims {
                    *proc.held.entry(c.resource).or_insert(0) += c.amount;
                }
            }
            self.queue.schedule(self.clock.now(), pr.pid);
        }
    }

    fn enter_store(&mut self, store: StoreId, item: Box<dyn Any>, sorted_priority: Option<Priority>) {
        let idx = store.as_raw() as usize;
        if let Some(waiter_pid) = self.stores[idx].take_waiter() {
            if let Some(proc) = self.processes.get(&waiter_pid) {
                proc.deliver_from_store(item);
                self.queue.schedule(self.clock.now(), waiter_pid);
                return;
            }
        }
        match sorted_priority {
            Some(p) => self.stores[idx].push_sorted_any(item, p),
            None => self.stores[idx].push_back_any(item),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn two_processes_contend_for_one_unit() {
        let log = Rc::new(RefCell::new(Vec::<(String, f64)>::new()));
        let mut sched = Scheduler::new();
        let r = sched.register_resource("staff", 1);

        for name in ["a", "b"] {
            let log = log.clone();
            let name = name.to_string();
            sched.spawn(name.clone(), move |ctx| {
                ctx.request_one(r, 1, Priority::Routine);
                log.borrow_mut().push((name.clone(), ctx.now()));
                ctx.hold(1.0);
                ctx.release(Some(r));
            });
        }
        sched.run(10.0).unwrap();
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, "a");
        assert_eq!(log[1].0, "b");
        assert!((log[1].1 - 1.0).abs() < 1e-9, "b should start after a releases at t=1");
    }

    #[test]
    fn urgent_waiter_preempts_routine_waiter_in_queue() {
        let log = Rc::new(RefCell::new(Vec::<String>::new()));
        let mut sched = Scheduler::new();
        let r = sched.register_resource("booking_in", 1);

        {
            let log = log.clone();
            sched.spawn("holder", move |ctx| {
                ctx.request_one(r, 1, Priority::Routine);
                ctx.hold(1.0);
                ctx.release(Some(r));
                log.borrow_mut().push("holder-done".into());
            });
        }
        {
            let log = log.clone();
            sched.spawn("routine-waiter", move |ctx| {
                ctx.hold(0.1);
                ctx.request_one(r, 1, Priority::Routine);
                log.borrow_mut().push("routine".into());
                ctx.release(Some(r));
            });
        }
        {
            let log = log.clone();
            sched.spawn("urgent-waiter", move |ctx| {
                ctx.hold(0.2);
                ctx.request_one(r, 1, Priority::Urgent);
                log.borrow_mut().push("urgent".into());
                ctx.release(Some(r));
            });
        }
        sched.run(10.0).unwrap();
        let log = log.borrow();
        assert_eq!(*log, vec!["holder-done", "urgent", "routine"]);
    }

    #[test]
    fn queue_monitor_tracks_waiter_count_across_request_and_wake() {
        let mut sched = Scheduler::new();
        let r = sched.register_resource("staff", 1);
        sched.spawn("holder", move |ctx| {
            ctx.request_one(r, 1, Priority::Routine);
            ctx.hold(1.0);
            ctx.release(Some(r));
        });
        sched.spawn("waiter", move |ctx| {
            ctx.hold(0.5);
            ctx.request_one(r, 1, Priority::Routine);
            ctx.hold(1.0);
            ctx.release(Some(r));
        });
        sched.run(10.0).unwrap();
        let samples = sched.queue_monitor(r).samples();
        assert!(samples.iter().any(|&(_, v)| v == 1.0), "waiter should have been queued at some point");
        assert_eq!(samples.last().unwrap().1, 0.0, "queue should drain once the waiter is granted");
    }

    #[test]
    fn from_store_blocks_until_entered() {
        let log = Rc::new(RefCell::new(Vec::<i32>::new()));
        let mut sched = Scheduler::new();
        let store = sched.register_store::<i32>("items");

        {
            let log = log.clone();
            sched.spawn("consumer", move |ctx| {
                let v: i32 = ctx.from_store(store);
                log.borrow_mut().push(v);
            });
        }
        sched.spawn("producer", move |ctx| {
            ctx.hold(2.0);
            ctx.enter(store, 7);
        });
        sched.run(10.0).unwrap();
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn release_of_unheld_resource_is_fatal() {
        let mut sched = Scheduler::new();
        let r = sched.register_resource("bms", 1);
        sched.spawn("bad", move |ctx| {
            ctx.release(Some(r));
        });
        let err = sched.run(10.0).unwrap_err();
        assert!(matches!(err, KernelError::ReleaseUnheld { .. }));
    }

    #[test]
    fn spawn_from_within_process_runs_concurrently() {
        let log = Rc::new(RefCell::new(Vec::<&'static str>::new()));
        let mut sched = Scheduler::new();
        {
            let log = log.clone();
            sched.spawn("operator", move |ctx| {
                let log1 = log.clone();
                ctx.spawn("child-a", move |ctx| {
                    ctx.hold(5.0);
                    log1.borrow_mut().push("a-done");
                });
                log.borrow_mut().push("operator-continued");
            });
        }
        sched.run(10.0).unwrap();
        assert_eq!(*log.borrow(), vec!["operator-continued", "a-done"]);
    }

    #[test]
    fn store_items_reads_back_entered_items_without_consuming() {
        let mut sched = Scheduler::new();
        let store = sched.register_store::<i32>("out");
        sched.spawn("producer", move |ctx| {
            ctx.enter(store, 1);
            ctx.enter(store, 2);
        });
        sched.run(1.0).unwrap();
        assert_eq!(sched.store_items::<i32>(store), vec![1, 2]);
        assert_eq!(sched.store_len(store), 2);
    }
}
