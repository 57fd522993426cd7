//! The four generic stage operators (spec §4.3 "Pipeline stage operators"),
//! grounded on `original_source/hpath/process/__core.py`'s `Process`,
//! `BatchingProcess`, `CollationProcess`, and `DeliveryProcess` base classes.
//!
//! Each function here registers one long-running [`hpath_kernel::Process`]
//! loop with a [`hpath_kernel::Scheduler`] and returns its id; the pipeline
//! modules in [`crate::pipeline`] call these once per stage at model setup
//! instead of hand-writing the loop every time.

use std::cell::RefCell;
use std::rc::Rc;

use hpath_common::error::KernelError;
use hpath_kernel::{Priority, ProcessContext, ProcessId, ResourceId, RngService, Scheduler, StoreId};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::entity::{Batch, DeliveryItem};

/// `Process` (spec §4.3.1): pull one item at a time from `in_store` and run
/// `handler` on it as an independently-scheduled child, so one slow item
/// never blocks the next pull. Mirrors `entity.activate(process=name)` in
/// the original — the Python runtime's cooperative scheduler lets every
/// activated entity interleave; here that is `ctx.spawn`.
pub fn spawn_process<T: 'static>(
    scheduler: &mut Scheduler,
    name: impl Into<String>,
    in_store: StoreId,
    handler: impl Fn(&ProcessContext, T) + 'static,
) -> ProcessId {
    let op_name = name.into();
    let handler = Rc::new(handler);
    let child_name = format!("{op_name}/item");
    scheduler.spawn(op_name, move |ctx| loop {
        let item: T = ctx.from_store(in_store);
        let handler = Rc::clone(&handler);
        let child_name = child_name.clone();
        ctx.spawn(child_name, move |ctx| handler(ctx, item));
    })
}

/// `BatchingProcess` (spec §4.3.3): accumulate exactly `batch_size` items
/// pulled one at a time from `in_store`, then hand the completed batch to
/// `out_store` as one non-blocking FIFO entry. Batch sizes in this model are
/// fixed configuration constants, not sampled (spec §6 "Batch sizes").
pub fn spawn_batching_process<T: 'static>(
    scheduler: &mut Scheduler,
    name: impl Into<String>,
    in_store: StoreId,
    out_store: StoreId,
    batch_size: u32,
) -> ProcessId {
    assert!(batch_size > 0, "batch size must be positive");
    scheduler.spawn(name, move |ctx| loop {
        let mut batch: Batch<T> = Batch::new();
        for _ in 0..batch_size {
            let item: T = ctx.from_store(in_store);
            batch.items.push(item);
        }
        ctx.enter(out_store, batch);
    })
}

/// `CollationProcess` (spec §4.3.2): wait for every child of a parent to
/// arrive (counted against `counter_name`, evaluated by `expected_count`)
/// before releasing the parent, sorted by its priority, into `out_store`.
/// Every child of one parent shares that parent's priority by inheritance,
/// so the priority of whichever child completes the bucket is also the
/// parent's.
///
/// A child arriving for a parent whose bucket has already reached
/// `counter_name` is the fatal "counter mismatch" of spec §7: it means some
/// upstream stage produced more children than the entity's own counter
/// field promised. That aborts the run with [`KernelError::CollatorOvercount`]
/// rather than silently starting a fresh bucket for an already-completed
/// parent.
pub fn spawn_collation_process<C, P>(
    scheduler: &mut Scheduler,
    name: impl Into<String>,
    in_store: StoreId,
    out_store: StoreId,
    parent_of: impl Fn(&C) -> P + 'static,
    priority_of: impl Fn(&C) -> Priority + 'static,
    counter_name: impl Into<String>,
    expected_count: impl Fn(P) -> u32 + 'static,
) -> ProcessId
where
    C: 'static,
    P: Eq + std::hash::Hash + Copy + std::fmt::Debug + 'static,
{
    let collator_name = name.into();
    let counter_name = counter_name.into();
    scheduler.spawn(collator_name.clone(), move |ctx| {
        let mut buckets: FxHashMap<P, Vec<C>> = FxHashMap::default();
        let mut completed: FxHashSet<P> = FxHashSet::default();
        loop {
            let child: C = ctx.from_store(in_store);
            let parent = parent_of(&child);
            let priority = priority_of(&child);

            if completed.contains(&parent) {
                ctx.fail(KernelError::CollatorOvercount {
                    collator: collator_name.clone(),
                    parent: format!("{parent:?}"),
                    counter: counter_name.clone(),
                });
            }

            let bucket = buckets.entry(parent).or_default();
            bucket.push(child);
            let count = bucket.len() as u32;
            let expected = expected_count(parent);
            if count == expected {
                buckets.remove(&parent);
                completed.insert(parent);
                ctx.enter_sorted(out_store, parent, priority);
            } else if count > expected {
                ctx.fail(KernelError::CollatorOvercount {
                    collator: collator_name.clone(),
                    parent: format!("{parent:?}"),
                    counter: counter_name.clone(),
                });
            }
        }
    })
}

/// `DeliveryProcess` (spec §4.3.4): claim a transport runner, hold an
/// outbound travel time, release the entity/batch into the next stage's
/// queue (sorted by each item's own priority), hold a return travel time,
/// then release the runner. A lone urgent entity uses its own priority for
/// the runner claim; a batch always claims at [`Priority::Routine`].
#[allow(clippy::too_many_arguments)]
pub fn spawn_delivery_process<T: Copy + 'static>(
    scheduler: &mut Scheduler,
    name: impl Into<String>,
    in_store: StoreId,
    out_store: StoreId,
    runner: ResourceId,
    rng: Rc<RefCell<RngService>>,
    out_duration: impl Fn(&mut RngService) -> f64 + 'static,
    return_duration: impl Fn(&mut RngService) -> f64 + 'static,
    priority_of: impl Fn(T) -> Priority + 'static,
) -> ProcessId {
    scheduler.spawn(name, move |ctx| loop {
        let item: DeliveryItem<T> = ctx.from_store(in_store);
        let delivery_priority = match &item {
            DeliveryItem::Single(t) => priority_of(*t),
            DeliveryItem::Batch(_) => Priority::Routine,
        };
        ctx.request_one(runner, 1, delivery_priority);
        ctx.hold(out_duration(&mut rng.borrow_mut()));
        match item {
            DeliveryItem::Single(t) => ctx.enter_sorted(out_store, t, priority_of(t)),
            DeliveryItem::Batch(batch) => {
                for t in batch.items {
                    ctx.enter_sorted(out_store, t, priority_of(t));
                }
            }
        }
        ctx.hold(return_duration(&mut rng.borrow_mut()));
        ctx.release(Some(runner));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpath_kernel::Scheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn process_operator_runs_items_concurrently() {
        let mut sched = Scheduler::new();
        let in_store = sched.register_store::<u32>("in");
        let log = Rc::new(RefCell::new(Vec::<(u32, f64)>::new()));

        spawn_process(&mut sched, "op", in_store, {
            let log = log.clone();
            move |ctx, item: u32| {
                let delay = if item == 1 { 5.0 } else { 1.0 };
                ctx.hold(delay);
                log.borrow_mut().push((item, ctx.now()));
            }
        });

        sched.spawn("feeder", move |ctx| {
            ctx.enter(in_store, 1u32);
            ctx.hold(0.1);
            ctx.enter(in_store, 2u32);
        });

        sched.run(20.0).unwrap();
        let log = log.borrow();
        // item 2 (shorter hold) finishes before item 1 despite arriving
        // later, proving the operator did not block on item 1.
        assert_eq!(log[0].0, 2);
        assert_eq!(log[1].0, 1);
    }

    #[test]
    fn batching_process_groups_fixed_size_batches() {
        let mut sched = Scheduler::new();
        let in_store = sched.register_store::<u32>("in");
        let out_store = sched.register_store::<Batch<u32>>("out");

        spawn_batching_process::<u32>(&mut sched, "batcher", in_store, out_store, 3);
        sched.spawn("feeder", move |ctx| {
            for i in 0..3u32 {
                ctx.enter(in_store, i);
            }
        });
        let log = Rc::new(RefCell::new(None));
        {
            let log = log.clone();
            sched.spawn("consumer", move |ctx| {
                let batch: Batch<u32> = ctx.from_store(out_store);
                *log.borrow_mut() = Some(batch.items);
            });
        }
        sched.run(5.0).unwrap();
        assert_eq!(*log.borrow(), Some(vec![0, 1, 2]));
    }

    #[test]
    fn collation_process_waits_for_full_count() {
        let mut sched = Scheduler::new();
        let in_store = sched.register_store::<(u32, u32)>("children"); // (parent, child)
        let out_store = sched.register_store::<u32>("parents");

        spawn_collation_process::<(u32, u32), u32>(
            &mut sched,
            "collate",
            in_store,
            out_store,
            |(parent, _child)| *parent,
            |_| Priority::Routine,
            "num_children",
            |_parent| 2,
        );

        sched.spawn("feeder", move |ctx| {
            ctx.enter(in_store, (7u32, 0u32));
            ctx.enter(in_store, (7u32, 1u32));
        });

        let log = Rc::new(RefCell::new(None));
        {
            let log = log.clone();
            sched.spawn("consumer", move |ctx| {
                let parent: u32 = ctx.from_store(out_store);
                *log.borrow_mut() = Some(parent);
            });
        }
        sched.run(5.0).unwrap();
        assert_eq!(*log.borrow(), Some(7));
    }

    #[test]
    fn collation_process_aborts_when_a_parent_receives_more_children_than_its_counter() {
        let mut sched = Scheduler::new();
        let in_store = sched.register_store::<(u32, u32)>("children");
        let out_store = sched.register_store::<u32>("parents");

        spawn_collation_process::<(u32, u32), u32>(
            &mut sched,
            "collate",
            in_store,
            out_store,
            |(parent, _child)| *parent,
            |_| Priority::Routine,
            "num_children",
            |_parent| 2,
        );

        sched.spawn("feeder", move |ctx| {
            ctx.enter(in_store, (7u32, 0u32));
            ctx.enter(in_store, (7u32, 1u32));
            ctx.enter(in_store, (7u32, 2u32));
        });

        let err = sched.run(5.0).unwrap_err();
        match err {
            KernelError::CollatorOvercount { collator, parent, counter } => {
                assert_eq!(collator, "collate");
                assert_eq!(parent, "7");
                assert_eq!(counter, "num_children");
            }
            other => panic!("expected CollatorOvercount, got {other:?}"),
        }
    }

    #[test]
    fn collation_process_aborts_when_a_late_child_arrives_for_an_already_completed_parent() {
        let mut sched = Scheduler::new();
        let in_store = sched.register_store::<(u32, u32)>("children");
        let out_store = sched.register_store::<u32>("parents");

        spawn_collation_process::<(u32, u32), u32>(
            &mut sched,
            "collate",
            in_store,
            out_store,
            |(parent, _child)| *parent,
            |_| Priority::Routine,
            "num_children",
            |_parent| 1,
        );

        sched.spawn("feeder", move |ctx| {
            ctx.enter(in_store, (7u32, 0u32));
            ctx.hold(1.0);
            ctx.enter(in_store, (7u32, 1u32));
        });

        sched.spawn("consumer", move |ctx| {
            let _: u32 = ctx.from_store(out_store);
        });

        let err = sched.run(5.0).unwrap_err();
        assert!(matches!(err, KernelError::CollatorOvercount { .. }));
    }

    #[test]
    fn delivery_process_claims_runner_and_unbatches() {
        let mut sched = Scheduler::new();
        let runner = sched.register_resource("runner", 1);
        let in_store = sched.register_store::<DeliveryItem<u32>>("in");
        let out_store = sched.register_store::<u32>("out");
        let rng = Rc::new(RefCell::new(RngService::new(1)));

        spawn_delivery_process::<u32>(
            &mut sched,
            "delivery",
            in_store,
            out_store,
            runner,
            rng,
            |_| 1.0,
            |_| 1.0,
            |_| Priority::Routine,
        );

        sched.spawn("feeder", move |ctx| {
            let mut batch = Batch::new();
            batch.items = vec![1, 2];
            ctx.enter(in_store, DeliveryItem::Batch(batch));
        });

        let log = Rc::new(RefCell::new(Vec::<u32>::new()));
        for _ in 0..2 {
            let log = log.clone();
            sched.spawn("consumer", move |ctx| {
                let v: u32 = ctx.from_store(out_store);
                log.borrow_mut().push(v);
            });
        }
        sched.run(10.0).unwrap();
        let mut got = log.borrow().clone();
        got.sort();
        assert_eq!(got, vec![1, 2]);
        assert_eq!(sched.resource(runner).claimed(), 0, "runner released at the end");
    }
}
