//! Wires the nine pipeline stages together (spec §4.5-§4.13: reception,
//! cut-up, processing, microtomy, staining, labelling, scanning, QC,
//! reporting), grounded stage-by-stage on
//! `original_source/hpath/process/p10_reception.py` through `p90_reporting.py`.
//!
//! Every stage follows the same shape: a [`crate::operators::spawn_process`]
//! handler reads one entity id out of an in-store, does its work against the
//! shared [`Entities`] arena, then routes the id into the next store —
//! either directly (`enter`/`enter_sorted`) or through a batching +
//! delivery pair built by [`wire_delivery_stage`]. Resources, task-duration
//! distributions and global probabilities are passed down from
//! [`crate::model::Model::new`] as already-resolved runtime types, so stage
//! bodies never touch configuration structs directly.

use std::cell::RefCell;
use std::rc::Rc;

use hpath_kernel::{Priority, ProcessContext, ResourceClaim, ResourceId, RngService, Scheduler, StoreId};

use crate::config::BatchSizes;
use crate::entity::{
    BlockId, BlockType, CutupType, DeliveryItem, Entities, SlideId, SlideType, Source, SpecimenBatch, SpecimenId,
};
use crate::model::{Resources, RuntimeGlobals, TaskDurations, Wips};
use crate::operators::{spawn_batching_process, spawn_collation_process, spawn_delivery_process, spawn_process};

/// A fixed travel time used for every porter/delivery hold in this model;
/// `original_source` calls these inline as `env.minutes(2)` / `env.minutes(5)`
/// rather than drawing them from configuration.
const fn minutes(m: f64) -> f64 {
    m / 60.0
}

/// The pair of stores feeding one [`wire_delivery_stage`]: non-urgent items
/// enter `batcher_in` and wait to be grouped; a lone urgent item skips the
/// batcher and enters `delivery_in` directly, sorted ahead of any batch
/// already queued there (spec §4.3.4 "the same in-queue receives both").
#[derive(Clone, Copy)]
struct DeliveryStage {
    batcher_in: StoreId,
    delivery_in: StoreId,
}

/// Route a specimen into a delivery stage per the urgent-fast-path /
/// batch-the-rest rule used at the end of every stage in this pipeline
/// (spec §4.6 "Routing"): `enter_sorted` a lone urgent specimen straight into
/// the delivery process's queue, FIFO-`enter` everyone else into the
/// batcher's queue.
fn route_to_delivery(ctx: &ProcessContext, stage: &DeliveryStage, id: SpecimenId, priority: Priority) {
    if priority == Priority::Urgent {
        ctx.enter_sorted(stage.delivery_in, id, Priority::Urgent);
    } else {
        ctx.enter(stage.batcher_in, id);
    }
}

/// Build one batching-then-delivery pipe: a [`spawn_batching_process`]
/// grouping non-urgent specimens into fixed-size batches, a tiny forwarder
/// wrapping each finished batch as a [`DeliveryItem::Batch`], and a
/// [`spawn_delivery_process`] claiming `runner` for `travel_hours` each way
/// before releasing items (sorted by their own priority) into `out_store`.
#[allow(clippy::too_many_arguments)]
fn wire_delivery_stage(
    scheduler: &mut Scheduler,
    prefix: &str,
    batch_size: u32,
    runner: ResourceId,
    rng: Rc<RefCell<RngService>>,
    travel_hours: f64,
    entities: Rc<Entities>,
    out_store: StoreId,
) -> DeliveryStage {
    let batcher_in = scheduler.register_store::<SpecimenId>(format!("{prefix}/batcher_in"));
    let batch_store = scheduler.register_store::<SpecimenBatch>(format!("{prefix}/batches"));
    let delivery_in = scheduler.register_store::<DeliveryItem<SpecimenId>>(format!("{prefix}/delivery_in"));

    spawn_batching_process::<SpecimenId>(scheduler, format!("batcher.{prefix}"), batcher_in, batch_store, batch_size);

    scheduler.spawn(format!("{prefix}/forward_batches"), move |ctx| loop {
        let batch: SpecimenBatch = ctx.from_store(batch_store);
        ctx.enter(delivery_in, DeliveryItem::Batch(batch));
    });

    let priority_entities = entities;
    spawn_delivery_process::<SpecimenId>(
        scheduler,
        prefix.to_string(),
        delivery_in,
        out_store,
        runner,
        rng,
        move |_rng| travel_hours,
        move |_rng| travel_hours,
        move |id| priority_entities.specimen(id).priority,
    );

    DeliveryStage { batcher_in, delivery_in }
}

fn as_count(n: i64) -> u32 {
    n.max(0) as u32
}

/// Which cut-up path an arriving specimen takes (spec §4.6 `cutup_start`).
/// Urgent specimens draw from the `*_urgent` probability pair instead of the
/// regular one.
fn cutup_probabilities(globals: &RuntimeGlobals, priority: Priority) -> (f64, f64) {
    if priority == Priority::Urgent {
        (globals.prob_bms_cutup_urgent, globals.prob_pool_cutup_urgent)
    } else {
        (globals.prob_bms_cutup, globals.prob_pool_cutup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CutupBranch {
    Bms,
    Pool,
    Large,
}

fn choose_cutup_branch(r: f64, prob_bms: f64, prob_pool: f64) -> CutupBranch {
    if r < prob_bms {
        CutupBranch::Bms
    } else if r < prob_bms + prob_pool {
        CutupBranch::Pool
    } else {
        CutupBranch::Large
    }
}

/// Whether a large-specimen cut-up produces mega or large-surgical blocks
/// (spec §4.6 `cutup_large`, DESIGN.md Open Question (b)): an urgent cut-up
/// never produces megas, unlike `original_source` whose `or` short-circuit
/// makes the mega draw unreachable once urgent is already true but still
/// *evaluates* `env.u01()` — here the roll is skipped entirely for urgent
/// specimens, which is the behaviour the short-circuit was clearly aiming for.
fn choose_large_cutup_type(priority: Priority, r: f64, prob_mega_blocks: f64) -> BlockType {
    if priority == Priority::Urgent {
        BlockType::LargeSurgical
    } else if r < prob_mega_blocks {
        BlockType::Mega
    } else {
        BlockType::LargeSurgical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecalcRoute {
    BoneStation,
    Oven,
    Direct,
}

fn choose_decalc_route(r: f64, prob_bone: f64, prob_oven: f64) -> DecalcRoute {
    if r < prob_bone {
        DecalcRoute::BoneStation
    } else if r < prob_bone + prob_oven {
        DecalcRoute::Oven
    } else {
        DecalcRoute::Direct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessingQueue {
    Urgents,
    Smalls,
    Larges,
    Megas,
}

/// Which processing-machine batcher a block joins (spec §4.6
/// `processing_assign_queue`, DESIGN.md Open Question (c)): urgent blocks
/// always go to the urgent batcher; everyone else routes by block type.
/// `original_source` writes this as three independent `if`s with no `elif`,
/// so the urgent branch is immediately overwritten by the block-type checks
/// that follow it — dead code that this mutually-exclusive match replaces.
fn choose_processing_queue(priority: Priority, block_type: BlockType) -> ProcessingQueue {
    if priority == Priority::Urgent {
        return ProcessingQueue::Urgents;
    }
    match block_type {
        BlockType::SmallSurgical => ProcessingQueue::Smalls,
        BlockType::LargeSurgical => ProcessingQueue::Larges,
        BlockType::Mega => ProcessingQueue::Megas,
    }
}

/// Which microtomy task and slide type a block produces (spec §4.7
/// `microtomy`).
fn choose_microtomy_slide_type(block_type: BlockType, r: f64, prob_levels: f64) -> SlideType {
    match block_type {
        BlockType::SmallSurgical => {
            if r < prob_levels {
                SlideType::Levels
            } else {
                SlideType::Serials
            }
        }
        BlockType::LargeSurgical => SlideType::Larges,
        BlockType::Mega => SlideType::Megas,
    }
}

/// Wire the full pipeline and return the store new arrivals should be
/// entered into (spec §4.5 `arrive_reception`'s `in_queue`).
#[allow(clippy::too_many_arguments)]
pub fn wire(
    scheduler: &mut Scheduler,
    entities: Rc<Entities>,
    rng: Rc<RefCell<RngService>>,
    resources: Rc<Resources>,
    durations: Rc<TaskDurations>,
    globals: Rc<RuntimeGlobals>,
    batch_sizes: &BatchSizes,
    wips: Rc<Wips>,
    completed_specimens: StoreId,
) -> StoreId {
    // ---- stores, declared in pipeline order so each stage's out-store
    // already exists when the stage before it is wired -------------------
    let reception_in = scheduler.register_store::<SpecimenId>("reception");
    let booking_in_in = scheduler.register_store::<SpecimenId>("booking_in");
    let cutup_start_in = scheduler.register_store::<SpecimenId>("cutup_start");
    let cutup_bms_in = scheduler.register_store::<SpecimenId>("cutup_bms");
    let cutup_pool_in = scheduler.register_store::<SpecimenId>("cutup_pool");
    let cutup_large_in = scheduler.register_store::<SpecimenId>("cutup_large");
    let processing_start_in = scheduler.register_store::<SpecimenId>("processing_start");
    let decalc_bone_station_in = scheduler.register_store::<BlockId>("decalc_bone_station");
    let decalc_bone_station_batches = scheduler.register_store::<crate::entity::BlockBatch>("decalc_bone_station/batches");
    let decalc_oven_in = scheduler.register_store::<BlockId>("decalc_oven");
    let processing_assign_queue_in = scheduler.register_store::<BlockId>("processing_assign_queue");
    let processing_urgents_in = scheduler.register_store::<BlockId>("processing_urgents");
    let processing_urgents_batches = scheduler.register_store::<crate::entity::BlockBatch>("processing_urgents/batches");
    let processing_smalls_in = scheduler.register_store::<BlockId>("processing_smalls");
    let processing_smalls_batches = scheduler.register_store::<crate::entity::BlockBatch>("processing_smalls/batches");
    let processing_larges_in = scheduler.register_store::<BlockId>("processing_larges");
    let processing_larges_batches = scheduler.register_store::<crate::entity::BlockBatch>("processing_larges/batches");
    let processing_megas_in = scheduler.register_store::<BlockId>("processing_megas");
    let processing_megas_batches = scheduler.register_store::<crate::entity::BlockBatch>("processing_megas/batches");
    let embed_and_trim_in = scheduler.register_store::<BlockId>("embed_and_trim");
    let collate_processing_in = scheduler.register_store::<BlockId>("collate.processing");
    let post_processing_in = scheduler.register_store::<SpecimenId>("post_processing");
    let microtomy_in = scheduler.register_store::<SpecimenId>("microtomy");
    let staining_start_in = scheduler.register_store::<SpecimenId>("staining_start");
    let staining_regular_in = scheduler.register_store::<SlideId>("staining_regular");
    let staining_regular_batches = scheduler.register_store::<crate::entity::SlideBatch>("staining_regular/batches");
    let staining_megas_in = scheduler.register_store::<SlideId>("staining_megas");
    let staining_megas_batches = scheduler.register_store::<crate::entity::SlideBatch>("staining_megas/batches");
    let collate_staining_slides_in = scheduler.register_store::<SlideId>("collate.staining.slides");
    let collate_staining_blocks_in = scheduler.register_store::<BlockId>("collate.staining.blocks");
    let post_staining_in = scheduler.register_store::<SpecimenId>("post_staining");
    let labelling_in = scheduler.register_store::<SpecimenId>("labelling");
    let scanning_start_in = scheduler.register_store::<SpecimenId>("scanning_start");
    let scanning_regular_in = scheduler.register_store::<SlideId>("scanning_regular");
    let scanning_regular_batches = scheduler.register_store::<crate::entity::SlideBatch>("scanning_regular/batches");
    let scanning_megas_in = scheduler.register_store::<SlideId>("scanning_megas");
    let scanning_megas_batches = scheduler.register_store::<crate::entity::SlideBatch>("scanning_megas/batches");
    let collate_scanning_slides_in = scheduler.register_store::<SlideId>("collate.scanning.slides");
    let collate_scanning_blocks_in = scheduler.register_store::<BlockId>("collate.scanning.blocks");
    let post_scanning_in = scheduler.register_store::<SpecimenId>("post_scanning");
    let qc_in = scheduler.register_store::<SpecimenId>("qc");
    let assign_histopath_in = scheduler.register_store::<SpecimenId>("assign_histopath");
    let report_in = scheduler.register_store::<SpecimenId>("report");

    // ---- delivery stages -------------------------------------------------
    let reception_to_cutup = wire_delivery_stage(
        scheduler,
        "reception_to_cutup",
        batch_sizes.deliver_reception_to_cut_up,
        resources.booking_in_staff,
        Rc::clone(&rng),
        minutes(2.0),
        Rc::clone(&entities),
        cutup_start_in,
    );
    let cutup_bms_to_processing = wire_delivery_stage(
        scheduler,
        "cutup_bms_to_processing",
        batch_sizes.deliver_cut_up_to_processing,
        resources.bms,
        Rc::clone(&rng),
        minutes(2.0),
        Rc::clone(&entities),
        processing_start_in,
    );
    let cutup_pool_to_processing = wire_delivery_stage(
        scheduler,
        "cutup_pool_to_processing",
        batch_sizes.deliver_cut_up_to_processing,
        resources.cut_up_assistant,
        Rc::clone(&rng),
        minutes(2.0),
        Rc::clone(&entities),
        processing_start_in,
    );
    let cutup_large_to_processing = wire_delivery_stage(
        scheduler,
        "cutup_large_to_processing",
        batch_sizes.deliver_cut_up_to_processing,
        resources.cut_up_assistant,
        Rc::clone(&rng),
        minutes(2.0),
        Rc::clone(&entities),
        processing_start_in,
    );
    let processing_to_microtomy = wire_delivery_stage(
        scheduler,
        "processing_to_microtomy",
        batch_sizes.deliver_processing_to_microtomy,
        resources.processing_room_staff,
        Rc::clone(&rng),
        minutes(2.0),
        Rc::clone(&entities),
        microtomy_in,
    );
    let microtomy_to_staining = wire_delivery_stage(
        scheduler,
        "microtomy_to_staining",
        batch_sizes.deliver_microtomy_to_staining,
        resources.microtomy_staff,
        Rc::clone(&rng),
        minutes(5.0),
        Rc::clone(&entities),
        staining_start_in,
    );
    let staining_to_labelling = wire_delivery_stage(
        scheduler,
        "staining_to_labelling",
        batch_sizes.deliver_staining_to_labelling,
        resources.staining_staff,
        Rc::clone(&rng),
        minutes(5.0),
        Rc::clone(&entities),
        labelling_in,
    );
    let labelling_to_scanning = wire_delivery_stage(
        scheduler,
        "labelling_to_scanning",
        batch_sizes.deliver_labelling_to_scanning,
        resources.microtomy_staff,
        Rc::clone(&rng),
        minutes(5.0),
        Rc::clone(&entities),
        scanning_start_in,
    );
    let scanning_to_qc = wire_delivery_stage(
        scheduler,
        "scanning_to_qc",
        batch_sizes.deliver_scanning_to_qc,
        resources.scanning_staff,
        Rc::clone(&rng),
        minutes(2.0),
        Rc::clone(&entities),
        qc_in,
    );

    // ======================== RECEPTION ===================================
    spawn_process(scheduler, "arrive_reception", reception_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let globals = Rc::clone(&globals);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.total.borrow_mut().inc(ctx.now());
            wips.in_reception.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.reception_start = Some(ctx.now());

            let r = rng.borrow_mut().uniform01();
            let source = if r < globals.prob_internal { Source::Internal } else { Source::External };
            entities.specimen_mut(id).source = source;
            let priority = entities.specimen(id).priority;

            // Receipt always preempts non-urgent booking-in work, regardless
            // of the specimen's own priority (spec §4.5, `p10_reception.py`).
            ctx.request_one(resources.booking_in_staff, 1, Priority::Urgent);
            ctx.hold(durations.receive_and_sort.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            ctx.enter_sorted(booking_in_in, id, priority);
        }
    });

    spawn_process(scheduler, "booking_in", booking_in_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let globals = Rc::clone(&globals);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            let priority = entities.specimen(id).priority;
            ctx.request_one(resources.booking_in_staff, 1, priority);

            if rng.borrow_mut().uniform01() < globals.prob_prebook {
                ctx.hold(durations.pre_booking_in_investigation.sample_hours(&mut rng.borrow_mut()));
            }

            let source = entities.specimen(id).source;
            match source {
                Source::Internal => ctx.hold(durations.booking_in_internal.sample_hours(&mut rng.borrow_mut())),
                Source::External => ctx.hold(durations.booking_in_external.sample_hours(&mut rng.borrow_mut())),
            }

            match source {
                Source::Internal => {
                    let r = rng.borrow_mut().uniform01();
                    if r < globals.prob_invest_easy {
                        ctx.hold(durations.booking_in_investigation_internal_easy.sample_hours(&mut rng.borrow_mut()));
                    } else if r < globals.prob_invest_easy + globals.prob_invest_hard {
                        ctx.hold(durations.booking_in_investigation_internal_hard.sample_hours(&mut rng.borrow_mut()));
                    }
                }
                Source::External => {
                    if rng.borrow_mut().uniform01() < globals.prob_invest_external {
                        ctx.hold(durations.booking_in_investigation_external.sample_hours(&mut rng.borrow_mut()));
                    }
                }
            }

            ctx.release(None);
            entities.specimen_mut(id).timestamps.reception_end = Some(ctx.now());
            wips.in_reception.borrow_mut().dec(ctx.now());

            route_to_delivery(ctx, &reception_to_cutup, id, priority);
        }
    });

    // ======================== CUT-UP ======================================
    spawn_process(scheduler, "cutup_start", cutup_start_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let globals = Rc::clone(&globals);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_cut_up.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.cutup_start = Some(ctx.now());

            let priority = entities.specimen(id).priority;
            let (prob_bms, prob_pool) = cutup_probabilities(&globals, priority);
            let r = rng.borrow_mut().uniform01();
            let (cutup_type, next_store) = match choose_cutup_branch(r, prob_bms, prob_pool) {
                CutupBranch::Bms => (CutupType::Bms, cutup_bms_in),
                CutupBranch::Pool => (CutupType::Pool, cutup_pool_in),
                CutupBranch::Large => (CutupType::Large, cutup_large_in),
            };
            entities.specimen_mut(id).cutup_type = Some(cutup_type);
            ctx.enter_sorted(next_store, id, priority);
        }
    });

    spawn_process(scheduler, "cutup_bms", cutup_bms_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            let priority = entities.specimen(id).priority;
            ctx.request_one(resources.bms, 1, priority);
            ctx.hold(durations.cut_up_bms.sample_hours(&mut rng.borrow_mut()));

            let block = entities.new_block(id, priority, BlockType::SmallSurgical);
            entities.specimen_mut(id).blocks.push(block);
            entities.specimen_mut(id).num_blocks = 1;

            ctx.release(None);
            wips.in_cut_up.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.cutup_end = Some(ctx.now());

            route_to_delivery(ctx, &cutup_bms_to_processing, id, priority);
        }
    });

    spawn_process(scheduler, "cutup_pool", cutup_pool_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            let priority = entities.specimen(id).priority;
            ctx.request_one(resources.cut_up_assistant, 1, priority);
            ctx.hold(durations.cut_up_pool.sample_hours(&mut rng.borrow_mut()));

            let block = entities.new_block(id, priority, BlockType::LargeSurgical);
            entities.specimen_mut(id).blocks.push(block);
            entities.specimen_mut(id).num_blocks = 1;

            ctx.release(None);
            wips.in_cut_up.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.cutup_end = Some(ctx.now());

            route_to_delivery(ctx, &cutup_pool_to_processing, id, priority);
        }
    });

    spawn_process(scheduler, "cutup_large", cutup_large_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let globals = Rc::clone(&globals);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            let priority = entities.specimen(id).priority;
            ctx.request_one(resources.cut_up_assistant, 1, priority);
            ctx.hold(durations.cut_up_large_specimens.sample_hours(&mut rng.borrow_mut()));

            let r = rng.borrow_mut().uniform01();
            let block_type = choose_large_cutup_type(priority, r, globals.prob_mega_blocks);
            let n_blocks = match block_type {
                BlockType::Mega => as_count(globals.num_blocks_mega.sample(&mut rng.borrow_mut())),
                _ => as_count(globals.num_blocks_large_surgical.sample(&mut rng.borrow_mut())),
            };

            for _ in 0..n_blocks {
                let block = entities.new_block(id, priority, block_type);
                entities.specimen_mut(id).blocks.push(block);
            }
            entities.specimen_mut(id).num_blocks = n_blocks;

            ctx.release(None);
            wips.in_cut_up.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.cutup_end = Some(ctx.now());

            route_to_delivery(ctx, &cutup_large_to_processing, id, priority);
        }
    });

    // ======================== PROCESSING ==================================
    spawn_process(scheduler, "processing_start", processing_start_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let globals = Rc::clone(&globals);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_processing.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.processing_start = Some(ctx.now());

            let r = rng.borrow_mut().uniform01();
            let route = choose_decalc_route(r, globals.prob_decalc_bone, globals.prob_decalc_oven);
            let out_queue = match route {
                DecalcRoute::BoneStation => decalc_bone_station_in,
                DecalcRoute::Oven => decalc_oven_in,
                DecalcRoute::Direct => processing_assign_queue_in,
            };

            let blocks = entities.specimen(id).blocks.clone();
            for block in blocks {
                let prio = entities.block(block).priority;
                ctx.enter_sorted(out_queue, block, prio);
            }
        }
    });

    spawn_batching_process::<BlockId>(
        scheduler,
        "batcher.decalc_bone_station",
        decalc_bone_station_in,
        decalc_bone_station_batches,
        batch_sizes.bone_station,
    );
    spawn_process(scheduler, "decalc_bone_station", decalc_bone_station_batches, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::BlockBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.bms, amount: 1 },
                    ResourceClaim { resource: resources.bone_station, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_bone_station.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.bms));

            ctx.hold(durations.decalc.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.bms, 1, Priority::Routine);
            ctx.hold(durations.unload_bone_station.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            for block in batch.items {
                let prio = entities.block(block).priority;
                ctx.enter_sorted(processing_assign_queue_in, block, prio);
            }
        }
    });

    spawn_process(scheduler, "decalc_oven", decalc_oven_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, block: BlockId| {
            let priority = entities.block(block).priority;
            ctx.request_one(resources.bms, 1, priority);
            ctx.hold(durations.load_into_decalc_oven.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.bms));

            ctx.hold(durations.decalc.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.bms, 1, priority);
            ctx.hold(durations.unload_from_decalc_oven.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            ctx.enter_sorted(processing_assign_queue_in, block, priority);
        }
    });

    spawn_process(scheduler, "processing_assign_queue", processing_assign_queue_in, {
        let entities = Rc::clone(&entities);
        move |ctx: &ProcessContext, block: BlockId| {
            let priority = entities.block(block).priority;
            let block_type = entities.block(block).block_type;
            let out_store = match choose_processing_queue(priority, block_type) {
                ProcessingQueue::Urgents => processing_urgents_in,
                ProcessingQueue::Smalls => processing_smalls_in,
                ProcessingQueue::Larges => processing_larges_in,
                ProcessingQueue::Megas => processing_megas_in,
            };
            ctx.enter_sorted(out_store, block, priority);
        }
    });

    spawn_batching_process::<BlockId>(
        scheduler,
        "batcher.processing_urgents",
        processing_urgents_in,
        processing_urgents_batches,
        batch_sizes.processing_regular,
    );
    spawn_process(scheduler, "processing_urgents", processing_urgents_batches, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::BlockBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.processing_room_staff, amount: 1 },
                    ResourceClaim { resource: resources.processing_machine, amount: 1 },
                ],
                Priority::Urgent,
            );
            ctx.hold(durations.load_processing_machine.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.processing_room_staff));

            ctx.hold(durations.processing_urgent.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.processing_room_staff, 1, Priority::Urgent);
            ctx.hold(durations.unload_processing_machine.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            for block in batch.items {
                let prio = entities.block(block).priority;
                ctx.enter_sorted(embed_and_trim_in, block, prio);
            }
        }
    });

    spawn_batching_process::<BlockId>(
        scheduler,
        "batcher.processing_smalls",
        processing_smalls_in,
        processing_smalls_batches,
        batch_sizes.processing_regular,
    );
    spawn_process(scheduler, "processing_smalls", processing_smalls_batches, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::BlockBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.processing_room_staff, amount: 1 },
                    ResourceClaim { resource: resources.processing_machine, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_processing_machine.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.processing_room_staff));

            ctx.hold(durations.processing_small_surgicals.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.processing_room_staff, 1, Priority::Routine);
            ctx.hold(durations.unload_processing_machine.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            for block in batch.items {
                let prio = entities.block(block).priority;
                ctx.enter_sorted(embed_and_trim_in, block, prio);
            }
        }
    });

    spawn_batching_process::<BlockId>(
        scheduler,
        "batcher.processing_larges",
        processing_larges_in,
        processing_larges_batches,
        batch_sizes.processing_regular,
    );
    spawn_process(scheduler, "processing_larges", processing_larges_batches, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::BlockBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.processing_room_staff, amount: 1 },
                    ResourceClaim { resource: resources.processing_machine, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_processing_machine.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.processing_room_staff));

            ctx.hold(durations.processing_large_surgicals.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.processing_room_staff, 1, Priority::Routine);
            ctx.hold(durations.unload_processing_machine.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            for block in batch.items {
                let prio = entities.block(block).priority;
                ctx.enter_sorted(embed_and_trim_in, block, prio);
            }
        }
    });

    spawn_batching_process::<BlockId>(
        scheduler,
        "batcher.processing_megas",
        processing_megas_in,
        processing_megas_batches,
        batch_sizes.processing_megas,
    );
    spawn_process(scheduler, "processing_megas", processing_megas_batches, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::BlockBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.processing_room_staff, amount: 1 },
                    ResourceClaim { resource: resources.processing_machine, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_processing_machine.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.processing_room_staff));

            ctx.hold(durations.processing_megas.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.processing_room_staff, 1, Priority::Routine);
            ctx.hold(durations.unload_processing_machine.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            for block in batch.items {
                let prio = entities.block(block).priority;
                ctx.enter_sorted(embed_and_trim_in, block, prio);
            }
        }
    });

    spawn_process(scheduler, "embed_and_trim", embed_and_trim_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, block: BlockId| {
            let priority = entities.block(block).priority;

            ctx.request_one(resources.processing_room_staff, 1, priority);
            ctx.hold(durations.embedding.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            ctx.hold(durations.embedding_cooldown.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.processing_room_staff, 1, priority);
            ctx.hold(durations.block_trimming.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            ctx.enter_sorted(collate_processing_in, block, priority);
        }
    });

    spawn_collation_process::<BlockId, SpecimenId>(
        scheduler,
        "collate.processing",
        collate_processing_in,
        post_processing_in,
        {
            let entities = Rc::clone(&entities);
            move |block: &BlockId| entities.block(*block).parent
        },
        {
            let entities = Rc::clone(&entities);
            move |block: &BlockId| entities.block(*block).priority
        },
        "num_blocks",
        {
            let entities = Rc::clone(&entities);
            move |specimen: SpecimenId| entities.specimen(specimen).num_blocks
        },
    );

    spawn_process(scheduler, "post_processing", post_processing_in, {
        let entities = Rc::clone(&entities);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_processing.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.processing_end = Some(ctx.now());
            let priority = entities.specimen(id).priority;
            route_to_delivery(ctx, &processing_to_microtomy, id, priority);
        }
    });

    // ======================== MICROTOMY ===================================
    spawn_process(scheduler, "microtomy", microtomy_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let globals = Rc::clone(&globals);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_microtomy.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.microtomy_start = Some(ctx.now());

            let priority = entities.specimen(id).priority;
            let mut total_slides = 0u32;
            let blocks = entities.specimen(id).blocks.clone();
            for block in blocks {
                ctx.request_one(resources.microtomy_staff, 1, priority);

                let block_type = entities.block(block).block_type;
                let r = rng.borrow_mut().uniform01();
                let slide_type = choose_microtomy_slide_type(block_type, r, globals.prob_microtomy_levels);
                let (hold_dist, count_dist) = match slide_type {
                    SlideType::Levels => (&durations.microtomy_levels, &globals.num_slides_levels),
                    SlideType::Serials => (&durations.microtomy_serials, &globals.num_slides_serials),
                    SlideType::Larges => (&durations.microtomy_larges, &globals.num_slides_larges),
                    SlideType::Megas => (&durations.microtomy_megas, &globals.num_slides_megas),
                };
                ctx.hold(hold_dist.sample_hours(&mut rng.borrow_mut()));
                let num_slides = as_count(count_dist.sample(&mut rng.borrow_mut()));

                for _ in 0..num_slides {
                    let slide = entities.new_slide(block, priority, slide_type);
                    entities.block_mut(block).slides.push(slide);
                }
                entities.block_mut(block).num_slides = num_slides;
                total_slides += num_slides;

                ctx.release(None);
            }

            entities.specimen_mut(id).total_slides = total_slides;
            wips.in_microtomy.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.microtomy_end = Some(ctx.now());

            route_to_delivery(ctx, &microtomy_to_staining, id, priority);
        }
    });

    // ======================== STAINING =====================================
    spawn_process(scheduler, "staining_start", staining_start_in, {
        let entities = Rc::clone(&entities);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_staining.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.staining_start = Some(ctx.now());

            let priority = entities.specimen(id).priority;
            let blocks = entities.specimen(id).blocks.clone();
            for block in blocks {
                let slides = entities.block(block).slides.clone();
                for slide in slides {
                    let slide_type = entities.slide(slide).slide_type;
                    if slide_type.is_mega() {
                        ctx.enter_sorted(staining_megas_in, slide, priority);
                    } else {
                        ctx.enter_sorted(staining_regular_in, slide, priority);
                    }
                }
            }
        }
    });

    spawn_batching_process::<SlideId>(
        scheduler,
        "batcher.staining_regular",
        staining_regular_in,
        staining_regular_batches,
        batch_sizes.staining_regular,
    );
    spawn_process(scheduler, "staining_regular", staining_regular_batches, {
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::SlideBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.staining_staff, amount: 1 },
                    ResourceClaim { resource: resources.staining_machine, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_staining_machine_regular.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.staining_staff));

            ctx.hold(durations.staining_regular.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.staining_staff, 1, Priority::Routine);
            ctx.hold(durations.unload_staining_machine_regular.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            ctx.request(
                vec![
                    ResourceClaim { resource: resources.staining_staff, amount: 1 },
                    ResourceClaim { resource: resources.coverslip_machine, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_coverslip_machine_regular.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.staining_staff));

            ctx.hold(durations.coverslip_regular.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.staining_staff, 1, Priority::Routine);
            ctx.hold(durations.unload_coverslip_machine_regular.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            for slide in batch.items {
                ctx.enter(collate_staining_slides_in, slide);
            }
        }
    });

    spawn_batching_process::<SlideId>(
        scheduler,
        "batcher.staining_megas",
        staining_megas_in,
        staining_megas_batches,
        batch_sizes.staining_megas,
    );
    spawn_process(scheduler, "staining_megas", staining_megas_batches, {
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::SlideBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.staining_staff, amount: 1 },
                    ResourceClaim { resource: resources.staining_machine, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_staining_machine_megas.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.staining_staff));

            ctx.hold(durations.staining_megas.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.staining_staff, 1, Priority::Routine);
            ctx.hold(durations.unload_staining_machine_megas.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.staining_machine));

            for slide in batch.items {
                ctx.hold(durations.coverslip_megas.sample_hours(&mut rng.borrow_mut()));
                ctx.enter(collate_staining_slides_in, slide);
            }

            ctx.release(None);
        }
    });

    spawn_collation_process::<SlideId, BlockId>(
        scheduler,
        "collate.staining.slides",
        collate_staining_slides_in,
        collate_staining_blocks_in,
        {
            let entities = Rc::clone(&entities);
            move |slide: &SlideId| entities.slide(*slide).parent
        },
        {
            let entities = Rc::clone(&entities);
            move |slide: &SlideId| entities.slide(*slide).priority
        },
        "num_slides",
        {
            let entities = Rc::clone(&entities);
            move |block: BlockId| entities.block(block).num_slides
        },
    );

    spawn_collation_process::<BlockId, SpecimenId>(
        scheduler,
        "collate.staining.blocks",
        collate_staining_blocks_in,
        post_staining_in,
        {
            let entities = Rc::clone(&entities);
            move |block: &BlockId| entities.block(*block).parent
        },
        {
            let entities = Rc::clone(&entities);
            move |block: &BlockId| entities.block(*block).priority
        },
        "num_blocks",
        {
            let entities = Rc::clone(&entities);
            move |specimen: SpecimenId| entities.specimen(specimen).num_blocks
        },
    );

    spawn_process(scheduler, "post_staining", post_staining_in, {
        let entities = Rc::clone(&entities);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_staining.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.staining_end = Some(ctx.now());
            let priority = entities.specimen(id).priority;
            route_to_delivery(ctx, &staining_to_labelling, id, priority);
        }
    });

    // ======================== LABELLING ====================================
    spawn_process(scheduler, "labelling", labelling_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_labelling.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.labelling_start = Some(ctx.now());

            let priority = entities.specimen(id).priority;
            ctx.request_one(resources.microtomy_staff, 1, priority);

            let slide_count: usize = entities
                .specimen(id)
                .blocks
                .iter()
                .map(|b| entities.block(*b).slides.len())
                .sum();
            for _ in 0..slide_count {
                ctx.hold(durations.labelling.sample_hours(&mut rng.borrow_mut()));
            }
            ctx.release(None);

            wips.in_labelling.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.labelling_end = Some(ctx.now());

            route_to_delivery(ctx, &labelling_to_scanning, id, priority);
        }
    });

    // ======================== SCANNING =====================================
    spawn_process(scheduler, "scanning_start", scanning_start_in, {
        let entities = Rc::clone(&entities);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_scanning.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.scanning_start = Some(ctx.now());

            let blocks = entities.specimen(id).blocks.clone();
            for block in blocks {
                let slides = entities.block(block).slides.clone();
                for slide in slides {
                    let slide_type = entities.slide(slide).slide_type;
                    if slide_type.is_mega() {
                        ctx.enter(scanning_megas_in, slide);
                    } else {
                        ctx.enter(scanning_regular_in, slide);
                    }
                }
            }
        }
    });

    spawn_batching_process::<SlideId>(
        scheduler,
        "batcher.scanning_regular",
        scanning_regular_in,
        scanning_regular_batches,
        batch_sizes.digital_scanning_regular,
    );
    spawn_process(scheduler, "scanning_regular", scanning_regular_batches, {
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::SlideBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.scanning_staff, amount: 1 },
                    ResourceClaim { resource: resources.scanning_machine_regular, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_scanning_machine_regular.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.scanning_staff));

            ctx.hold(durations.scanning_regular.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.scanning_staff, 1, Priority::Routine);
            ctx.hold(durations.unload_scanning_machine_regular.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            for slide in batch.items {
                ctx.enter(collate_scanning_slides_in, slide);
            }
        }
    });

    spawn_batching_process::<SlideId>(
        scheduler,
        "batcher.scanning_megas",
        scanning_megas_in,
        scanning_megas_batches,
        batch_sizes.digital_scanning_megas,
    );
    spawn_process(scheduler, "scanning_megas", scanning_megas_batches, {
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, batch: crate::entity::SlideBatch| {
            ctx.request(
                vec![
                    ResourceClaim { resource: resources.scanning_staff, amount: 1 },
                    ResourceClaim { resource: resources.scanning_machine_megas, amount: 1 },
                ],
                Priority::Routine,
            );
            ctx.hold(durations.load_scanning_machine_megas.sample_hours(&mut rng.borrow_mut()));
            ctx.release(Some(resources.scanning_staff));

            ctx.hold(durations.scanning_megas.sample_hours(&mut rng.borrow_mut()));

            ctx.request_one(resources.scanning_staff, 1, Priority::Routine);
            ctx.hold(durations.unload_scanning_machine_megas.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            for slide in batch.items {
                ctx.enter(collate_scanning_slides_in, slide);
            }
        }
    });

    spawn_collation_process::<SlideId, BlockId>(
        scheduler,
        "collate.scanning.slides",
        collate_scanning_slides_in,
        collate_scanning_blocks_in,
        {
            let entities = Rc::clone(&entities);
            move |slide: &SlideId| entities.slide(*slide).parent
        },
        {
            let entities = Rc::clone(&entities);
            move |slide: &SlideId| entities.slide(*slide).priority
        },
        "num_slides",
        {
            let entities = Rc::clone(&entities);
            move |block: BlockId| entities.block(block).num_slides
        },
    );

    spawn_collation_process::<BlockId, SpecimenId>(
        scheduler,
        "collate.scanning.blocks",
        collate_scanning_blocks_in,
        post_scanning_in,
        {
            let entities = Rc::clone(&entities);
            move |block: &BlockId| entities.block(*block).parent
        },
        {
            let entities = Rc::clone(&entities);
            move |block: &BlockId| entities.block(*block).priority
        },
        "num_blocks",
        {
            let entities = Rc::clone(&entities);
            move |specimen: SpecimenId| entities.specimen(specimen).num_blocks
        },
    );

    // Open Question (d): route by the same urgent-fast-path rule every other
    // stage uses, instead of `original_source`'s unconditional `enter_sorted`
    // into the batcher (which would put an urgent specimen in a
    // `BatchingProcess` store, contradicting spec §4.3.3's invariant that
    // urgent entities never wait there).
    spawn_process(scheduler, "post_scanning", post_scanning_in, {
        let entities = Rc::clone(&entities);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_scanning.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.scanning_end = Some(ctx.now());
            let priority = entities.specimen(id).priority;
            route_to_delivery(ctx, &scanning_to_qc, id, priority);
        }
    });

    // ======================== QC & REPORTING ===============================
    spawn_process(scheduler, "qc", qc_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_qc.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.qc_start = Some(ctx.now());

            let priority = entities.specimen(id).priority;
            ctx.request_one(resources.qc_staff, 1, priority);
            ctx.hold(durations.block_and_quality_check.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            wips.in_qc.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.qc_end = Some(ctx.now());

            ctx.enter(assign_histopath_in, id);
        }
    });

    spawn_process(scheduler, "assign_histopath", assign_histopath_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        move |ctx: &ProcessContext, id: SpecimenId| {
            let priority = entities.specimen(id).priority;
            ctx.request_one(resources.qc_staff, 1, priority);
            ctx.hold(durations.assign_histopathologist.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            ctx.enter(report_in, id);
        }
    });

    spawn_process(scheduler, "report", report_in, {
        let entities = Rc::clone(&entities);
        let rng = Rc::clone(&rng);
        let durations = Rc::clone(&durations);
        let resources = Rc::clone(&resources);
        let wips = Rc::clone(&wips);
        move |ctx: &ProcessContext, id: SpecimenId| {
            wips.in_reporting.borrow_mut().inc(ctx.now());
            entities.specimen_mut(id).timestamps.report_start = Some(ctx.now());

            let priority = entities.specimen(id).priority;
            ctx.request_one(resources.histopathologist, 1, priority);
            ctx.hold(durations.write_report.sample_hours(&mut rng.borrow_mut()));
            ctx.release(None);

            wips.in_reporting.borrow_mut().dec(ctx.now());
            entities.specimen_mut(id).timestamps.report_end = Some(ctx.now());
            wips.total.borrow_mut().dec(ctx.now());

            ctx.enter(completed_specimens, id);
        }
    });

    reception_in
}
