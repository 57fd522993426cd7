//! Specimen arrivals (spec §4.4 "Arrivals"), grounded on
//! `original_source/hpath/process/__core.py::ArrivalGenerator` and
//! `hpath/specimens.py::Specimen.setup`.
//!
//! The original constructs one `ArrivalGenerator` for the cancer pathway and
//! one for the non-cancer pathway, but passes `cancer=True` to both — every
//! arriving specimen samples its priority off the cancer probability table
//! regardless of which schedule produced it. This port threads the correct
//! boolean through each generator instead.

use std::cell::RefCell;
use std::rc::Rc;

use hpath_kernel::{Priority, ProcessContext, ProcessId, RngService, Scheduler, StoreId};

use crate::config::{ArrivalSchedule, GlobalVars};
use crate::entity::{Entities, Source, SpecimenId};

/// Sample the priority an arriving specimen is assigned (spec §4.4, §4.9
/// "Priority"): urgent, then priority, then cancer-or-routine, weighted by
/// the cancer/non-cancer probability pair.
fn sample_priority(rng: &mut RngService, globals: &GlobalVars, cancer: bool) -> Priority {
    let (p_urgent, p_priority) = if cancer {
        (globals.prob_urgent_cancer, globals.prob_priority_cancer)
    } else {
        (globals.prob_urgent_non_cancer, globals.prob_priority_non_cancer)
    };
    let u = rng.uniform01();
    if u < p_urgent {
        Priority::Urgent
    } else if u < p_urgent + p_priority {
        Priority::Priority
    } else if cancer {
        Priority::Cancer
    } else {
        Priority::Routine
    }
}

/// Register one arrival pathway. Runs forever, cycling the 168-hour
/// schedule: for every hour with a positive rate, spawns a concurrent
/// sub-generator that emits specimens at `Exponential(rate)` intervals for
/// that one hour, then advances to the next hour itself.
pub fn spawn_arrival_generator(
    scheduler: &mut Scheduler,
    name: impl Into<String>,
    entities: Rc<Entities>,
    rng: Rc<RefCell<RngService>>,
    globals: GlobalVars,
    schedule: Rc<ArrivalSchedule>,
    cancer: bool,
    reception_store: StoreId,
) -> ProcessId {
    scheduler.spawn(name, move |ctx: &ProcessContext| {
        let mut hour_of_week: usize = 0;
        loop {
            let rate = schedule.rate_at_hour(hour_of_week);
            if rate > 0.0 {
                let entities = Rc::clone(&entities);
                let rng = Rc::clone(&rng);
                let deadline = ctx.now() + 1.0;
                ctx.spawn(format!("arrivals/component/h{hour_of_week}"), move |ctx| {
                    emit_for_one_hour(ctx, &entities, &rng, &globals, rate, cancer, reception_store, deadline);
                });
            }
            ctx.hold(1.0);
            hour_of_week += 1;
        }
    })
}

fn emit_for_one_hour(
    ctx: &ProcessContext,
    entities: &Entities,
    rng: &RefCell<RngService>,
    globals: &GlobalVars,
    rate: f64,
    cancer: bool,
    reception_store: StoreId,
    deadline: f64,
) {
    loop {
        let dt = rng.borrow_mut().exponential_hours(rate);
        ctx.hold(dt);
        if ctx.now() >= deadline {
            return;
        }
        let priority = sample_priority(&mut rng.borrow_mut(), globals, cancer);
        // Source (internal/external) is sampled at the reception stage
        // (spec §4.5 `arrive_reception`), not at arrival.
        let id: SpecimenId = entities.new_specimen(priority, cancer, Source::Internal);
        ctx.enter_sorted(reception_store, id, priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntDistributionInfo, IntDistributionKind};

    fn globals_fixture() -> GlobalVars {
        let zero_int = IntDistributionInfo {
            kind: IntDistributionKind::Constant,
            low: 1,
            mode: 1,
            high: 1,
        };
        GlobalVars {
            prob_internal: 0.5,
            prob_urgent_cancer: 0.2,
            prob_urgent_non_cancer: 0.1,
            prob_priority_cancer: 0.3,
            prob_priority_non_cancer: 0.2,
            prob_routine_cancer: 0.5,
            prob_routine_non_cancer: 0.7,
            prob_prebook: 0.1,
            prob_invest_easy: 0.1,
            prob_invest_hard: 0.1,
            prob_invest_external: 0.1,
            prob_bms_cutup: 0.3,
            prob_bms_cutup_urgent: 0.3,
            prob_large_cutup: 0.3,
            prob_large_cutup_urgent: 0.3,
            prob_pool_cutup: 0.3,
            prob_pool_cutup_urgent: 0.3,
            prob_mega_blocks: 0.1,
            prob_decalc_bone: 0.1,
            prob_decalc_oven: 0.1,
            prob_microtomy_levels: 0.5,
            num_blocks_large_surgical: zero_int,
            num_blocks_mega: zero_int,
            num_slides_larges: zero_int,
            num_slides_levels: zero_int,
            num_slides_megas: zero_int,
            num_slides_serials: zero_int,
        }
    }

    #[test]
    fn priority_sampling_respects_cancer_flag() {
        let globals = globals_fixture();
        let mut rng = RngService::new(5);
        let mut urgent_cancer = 0;
        let mut urgent_noncancer = 0;
        for _ in 0..2000 {
            if sample_priority(&mut rng, &globals, true) == Priority::Urgent {
                urgent_cancer += 1;
            }
            if sample_priority(&mut rng, &globals, false) == Priority::Urgent {
                urgent_noncancer += 1;
            }
        }
        // Cancer uses prob_urgent_cancer (0.2), non-cancer uses
        // prob_urgent_non_cancer (0.1) — the two tallies should differ.
        assert!(urgent_cancer > urgent_noncancer);
    }

    #[test]
    fn arrivals_feed_reception_store_sorted_by_priority() {
        let mut sched = Scheduler::new();
        let reception = sched.register_store::<SpecimenId>("reception");
        let entities = Rc::new(Entities::new());
        let rng = Rc::new(RefCell::new(RngService::new(3)));
        let schedule = Rc::new(ArrivalSchedule {
            rates: {
                let mut r = vec![0.0; 168];
                r[0] = 20.0;
                r
            },
        });
        spawn_arrival_generator(
            &mut sched,
            "cancer-arrivals",
            entities.clone(),
            rng,
            globals_fixture(),
            schedule,
            true,
            reception,
        );
        sched.run(1.0).unwrap();
        assert!(entities.specimen_count() > 0);
        assert!(sched.store_len(reception) > 0);
    }
}
