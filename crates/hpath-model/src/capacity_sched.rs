//! Per-resource capacity scheduler (spec §4.3.1 "Capacity scheduler"),
//! grounded on `original_source/hpath/process/__core.py::ResourceScheduler`.
//!
//! Cycles a resource's weekly [`crate::config::ResourceSchedule`] forever:
//! on a day with the flag unset, capacity drops to zero for the whole day;
//! otherwise it steps through the 48 half-hourly allocations, holding
//! [`RESOURCE_ALLOCATION_INTERVAL_HOURS`] between each. The original only
//! calls `set_capacity` when the allocation actually changes (or at `t=0`,
//! to force the initial value); this keeps the capacity monitor free of
//! redundant samples by tracking the last value it set locally rather than
//! reading the resource back.

use hpath_kernel::{ProcessContext, ProcessId, ResourceId, Scheduler};

use crate::config::ResourceSchedule;

/// `original_source/hpath/util.py::RESOURCE_ALLOCATION_INTERVAL_HOURS`.
const RESOURCE_ALLOCATION_INTERVAL_HOURS: f64 = 0.5;

/// Hours in a full day, the hold used while a day's flag is unset.
const DAY_HOURS: f64 = 24.0;

pub fn spawn_capacity_scheduler(
    scheduler: &mut Scheduler,
    name: impl Into<String>,
    resource: ResourceId,
    schedule: ResourceSchedule,
) -> ProcessId {
    scheduler.spawn(name, move |ctx: &ProcessContext| {
        let mut day = 0usize;
        let mut last_set: Option<i64> = None;
        loop {
            if !schedule.day_flags[day % 7] {
                set_if_changed(ctx, resource, 0, &mut last_set);
                ctx.hold(DAY_HOURS);
            } else {
                for &allocation in schedule.allocation.iter() {
                    set_if_changed(ctx, resource, allocation as i64, &mut last_set);
                    ctx.hold(RESOURCE_ALLOCATION_INTERVAL_HOURS);
                }
            }
            day += 1;
        }
    })
}

fn set_if_changed(ctx: &ProcessContext, resource: ResourceId, capacity: i64, last_set: &mut Option<i64>) {
    if *last_set != Some(capacity) || ctx.now() == 0.0 {
        ctx.set_capacity(resource, capacity);
        *last_set = Some(capacity);
    }
}
