//! Cooperative process runtime.
//!
//! Adapted from `snow-rt/src/actor/{process,stack}.rs`: there each actor is a
//! stackful `corosensei` coroutine driven by an M:N work-stealing scheduler
//! across OS threads. The single-dispatch invariant of spec §5 means this
//! kernel needs none of that: every [`Process`] here runs on the one OS
//! thread driving [`crate::scheduler::Scheduler`], so the thread-local
//! yielder handshake `stack.rs` uses becomes a plain [`Cell`] on the
//! [`ProcessContext`] each coroutine closure captures by reference.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use corosensei::{Coroutine, CoroutineResult, Yielder};
use hpath_common::error::KernelError;
use rustc_hash::FxHashMap;

use crate::clock::SimClock;
use crate::priority::Priority;
use crate::resource::ResourceId;
use crate::store::StoreId;

/// Identifies a process (an entity lifecycle or a stage operator loop)
/// within one [`crate::scheduler::Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Allocate a fresh, globally unique process id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        ProcessId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Construct a `ProcessId` from a known raw value. Used by tests that
    /// need deterministic ids without touching the global counter.
    pub fn from_raw(n: u64) -> Self {
        ProcessId(n)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc#{}", self.0)
    }
}

/// One resource claim within a (possibly multi-resource) [`Suspend::Request`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceClaim {
    pub resource: ResourceId,
    pub amount: u32,
}

/// The complete set of suspending operations a process body may perform
/// (spec §4.2). Every call into [`ProcessContext`] yields exactly one of
/// these back to the scheduler, which performs the actual bookkeeping
/// (resources, stores) before resuming the coroutine.
pub enum Suspend {
    /// Reschedule self at `now + d`.
    Hold(f64),
    /// Atomically claim `amount` units of every listed resource at
    /// `priority`. Does not return until all claims are simultaneously
    /// satisfied.
    Request {
        claims: Vec<ResourceClaim>,
        priority: Priority,
    },
    /// Release one named resource this process holds, or all of them.
    Release(Option<ResourceId>),
    /// Block until `store` is non-empty, then remove and return its head.
    FromStore(StoreId),
    /// Append `item` to `store` (FIFO, non-blocking).
    Enter { store: StoreId, item: Box<dyn Any> },
    /// Insert `item` into `store` ordered by `priority` (non-blocking).
    EnterSorted {
        store: StoreId,
        item: Box<dyn Any>,
        priority: Priority,
    },
    /// Spawn a new concurrent process, fire-and-forget. Used by the
    /// `Process` stage operator (spec §4.5.1) to process each item it
    /// pulls off its input store without blocking the loop that pulls the
    /// next one.
    Spawn {
        name: String,
        body: Box<dyn FnOnce(&ProcessContext)>,
    },
    /// Set a resource's capacity at the current time (spec §4.3.1 "Capacity
    /// scheduler"). Handled synchronously by the scheduler; may wake
    /// processes pending on that resource.
    SetCapacity { resource: ResourceId, capacity: i64 },
    /// Abort the run with a fatal invariant violation (spec §7) that a
    /// process body detected itself, such as a collator seeing more
    /// children than its counter allows. The scheduler never resumes this
    /// process again; `Scheduler::dispatch` returns `Err(err)` in its place.
    Fail(KernelError),
}

impl fmt::Debug for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suspend::Hold(d) => write!(f, "Hold({d})"),
            Suspend::Request { claims, priority } => {
                write!(f, "Request({} claims, {priority})", claims.len())
            }
            Suspend::Release(r) => write!(f, "Release({r:?})"),
            Suspend::FromStore(s) => write!(f, "FromStore({s:?})"),
            Suspend::Enter { store, .. } => write!(f, "Enter({store:?})"),
            Suspend::EnterSorted { store, priority, .. } => {
                write!(f, "EnterSorted({store:?}, {priority})")
            }
            Suspend::Spawn { name, .. } => write!(f, "Spawn({name})"),
            Suspend::SetCapacity { resource, capacity } => {
                write!(f, "SetCapacity({resource:?}, {capacity})")
            }
            Suspend::Fail(err) => write!(f, "Fail({err})"),
        }
    }
}

/// Handed to a process body by reference; every suspending operation is a
/// method here.
///
/// `yielder_ptr` is set for the duration of one coroutine resume. It is
/// safe to dereference only while that coroutine is the one actively
/// running, which the single-dispatch scheduler guarantees.
pub struct ProcessContext {
    yielder_ptr: Cell<*const ()>,
    from_store_result: Cell<Option<Box<dyn Any>>>,
    clock: SimClock,
}

impl ProcessContext {
    fn new(clock: SimClock) -> Self {
        Self {
            yielder_ptr: Cell::new(std::ptr::null()),
            from_store_result: Cell::new(None),
            clock,
        }
    }

    /// The scheduler's current simulated time. Safe to read at any point in
    /// a process body between suspensions; never advances except across a
    /// `hold`/`request` suspend (spec §4.1).
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Spawn a new concurrent process (fire-and-forget): the caller's loop
    /// continues without waiting for it.
    pub fn spawn(&self, name: impl Into<String>, body: impl FnOnce(&ProcessContext) + 'static) {
        self.suspend(Suspend::Spawn {
            name: name.into(),
            body: Box::new(body),
        });
    }

    fn suspend(&self, op: Suspend) {
        let ptr = self.yielder_ptr.get();
        debug_assert!(!ptr.is_null(), "suspend called outside a running process");
        // SAFETY: `ptr` was installed by `Process::resume` at the start of
        // this resume and is only ever read while that same coroutine is
        // executing (single-dispatch invariant, spec §5).
        let yielder: &Yielder<(), Suspend> = unsafe { &*(ptr as *const Yielder<(), Suspend>) };
        yielder.suspend(op);
    }

    /// `hold(d)`: reschedule self at `now + d`.
    pub fn hold(&self, hours: f64) {
        self.suspend(Suspend::Hold(hours));
    }

    /// `request((r, n, p), …)`.
    pub fn request(&self, claims: Vec<ResourceClaim>, priority: Priority) {
        self.suspend(Suspend::Request { claims, priority });
    }

    /// Convenience for the common single-resource request.
    pub fn request_one(&self, resource: ResourceId, amount: u32, priority: Priority) {
        self.request(vec![ResourceClaim { resource, amount }], priority);
    }

    /// `release(r)` or `release()` (all held resources).
    pub fn release(&self, resource: Option<ResourceId>) {
        self.suspend(Suspend::Release(resource));
    }

    /// `from_store(s)`: block until `s` is non-empty, then return its head.
    pub fn from_store<T: 'static>(&self, store: StoreId) -> T {
        self.suspend(Suspend::FromStore(store));
        let boxed = self
            .from_store_result
            .take()
            .expect("scheduler must deliver a from_store result before resuming");
        *boxed
            .downcast::<T>()
            .expect("from_store type mismatch: store item type does not match caller's expectation")
    }

    /// `enter(s)`: append, non-blocking.
    pub fn enter<T: 'static>(&self, store: StoreId, item: T) {
        self.suspend(Suspend::Enter {
            store,
            item: Box::new(item),
        });
    }

    /// `enter_sorted(s, p)`: priority insert, non-blocking.
    pub fn enter_sorted<T: 'static>(&self, store: StoreId, item: T, priority: Priority) {
        self.suspend(Suspend::EnterSorted {
            store,
            item: Box::new(item),
            priority,
        });
    }

    /// `set_capacity(r, c)`: change a resource's capacity at the current
    /// time. Used only by the per-resource capacity scheduler process
    /// (spec §4.3.1); ordinary stage handlers never call this.
    pub fn set_capacity(&self, resource: ResourceId, capacity: i64) {
        self.suspend(Suspend::SetCapacity { resource, capacity });
    }

    /// Abort the whole run with a fatal invariant violation (spec §7) this
    /// process body detected itself. Never returns: the scheduler drops
    /// this process instead of resuming it again.
    pub fn fail(&self, err: KernelError) -> ! {
        self.suspend(Suspend::Fail(err));
        unreachable!("a process is never resumed after Suspend::Fail")
    }

    /// Called by the scheduler right before resuming a process that was
    /// blocked in `from_store`, to deliver the item it was waiting for.
    pub(crate) fn deliver_from_store(&self, item: Box<dyn Any>) {
        self.from_store_result.set(Some(item));
    }
}

type ProcCoroutine = Coroutine<(), Suspend, ()>;

/// A process: a stackful coroutine plus the resources it currently holds.
///
/// Every entity lifecycle and every stage operator loop (spec §2 component
/// 7) is one of these; there is no separate "task" abstraction.
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    coro: ProcCoroutine,
    ctx: *const ProcessContext,
    /// Resources this process currently holds, and how many units of each.
    pub held: FxHashMap<ResourceId, u32>,
}

// `Process` owns its coroutine's stack exclusively and is only ever driven
// from the single scheduler thread; the raw `ctx` pointer lives for the
// process's entire lifetime (see `Process::new`).
unsafe impl Send for Process {}

impl Process {
    /// Spawn a new process running `body`. `body` receives a `&ProcessContext`
    /// it uses to perform suspending operations.
    pub fn spawn(
        name: impl Into<String>,
        clock: SimClock,
        body: impl FnOnce(&ProcessContext) + 'static,
    ) -> Self {
        let ctx = Box::into_raw(Box::new(ProcessContext::new(clock)));
        // SAFETY: `ctx` is leaked for the process's lifetime and freed in
        // `Drop`; the coroutine closure below only dereferences it while
        // running, and only one coroutine runs at a time.
        let ctx_ref: &'static ProcessContext = unsafe { &*ctx };

        let coro = Coroutine::new(move |yielder: &Yielder<(), Suspend>, _first: ()| {
            ctx_ref
                .yielder_ptr
                .set(yielder as *const Yielder<(), Suspend> as *const ());
            body(ctx_ref);
        });

        Process {
            id: ProcessId::next(),
            name: name.into(),
            coro,
            ctx,
            held: FxHashMap::default(),
        }
    }

    /// Resume this process. Returns `Some(op)` if it suspended on `op`, or
    /// `None` if its body returned (the process has terminated).
    pub fn resume(&mut self) -> Option<Suspend> {
        match self.coro.resume(()) {
            CoroutineResult::Yield(op) => Some(op),
            CoroutineResult::Return(()) => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.coro.done()
    }

    /// Deliver a `from_store` result ahead of the next `resume`.
    pub fn deliver_from_store(&self, item: Box<dyn Any>) {
        // SAFETY: see `Process::spawn`.
        unsafe { &*self.ctx }.deliver_from_store(item);
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        // SAFETY: `ctx` was uniquely allocated for this process in `spawn`
        // and nothing else retains a reference once the coroutine (which
        // borrowed it for 'static but only dereferences while resumed) is
        // gone.
        unsafe {
            drop(Box::from_raw(self.ctx as *mut ProcessContext));
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("held", &self.held)
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_runs_to_completion_without_suspending() {
        let mut p = Process::spawn("noop", SimClock::new(), |_ctx| {});
        assert!(p.resume().is_none());
        assert!(p.is_done());
    }

    #[test]
    fn process_holds_then_completes() {
        let mut p = Process::spawn("holder", SimClock::new(), |ctx| {
            ctx.hold(1.5);
        });
        match p.resume() {
            Some(Suspend::Hold(d)) => assert_eq!(d, 1.5),
            other => panic!("expected Hold, got {other:?}"),
        }
        assert!(!p.is_done());
        assert!(p.resume().is_none());
        assert!(p.is_done());
    }

    #[test]
    fn from_store_roundtrips_typed_value() {
        let mut p = Process::spawn("consumer", SimClock::new(), |ctx| {
            let v: u32 = ctx.from_store(StoreId::from_raw(0));
            assert_eq!(v, 42);
            ctx.hold(0.0);
        });
        assert!(matches!(p.resume(), Some(Suspend::FromStore(_))));
        p.deliver_from_store(Box::new(42u32));
        assert!(matches!(p.resume(), Some(Suspend::Hold(_))));
    }
}
