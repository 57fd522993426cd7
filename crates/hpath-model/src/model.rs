//! The `Model`: owns every resource, store, and process for one simulation
//! run and wires the nine-stage pipeline between them (spec §2 component
//! 7 "Model assembly"), grounded on `original_source/hpath/model.py`.

use std::cell::RefCell;
use std::rc::Rc;

use hpath_common::error::SimError;
use hpath_kernel::{Distribution, Duration, IntDistribution, Monitor, ResourceId, RngService, Scheduler};

use crate::arrivals::spawn_arrival_generator;
use crate::capacity_sched::spawn_capacity_scheduler;
use crate::config::{Config, DistributionInfo, GlobalVars, IntDistributionInfo, ResourcesInfo, TaskDurationsInfo};
use crate::entity::{Entities, SpecimenId};
use crate::kpis::Report;
use crate::pipeline;

/// The model's 15 named resources (spec §6), mirroring
/// `original_source/hpath/model.py::Resources` field-for-field.
pub struct Resources {
    pub booking_in_staff: ResourceId,
    pub bms: ResourceId,
    pub cut_up_assistant: ResourceId,
    pub processing_room_staff: ResourceId,
    pub microtomy_staff: ResourceId,
    pub staining_staff: ResourceId,
    pub scanning_staff: ResourceId,
    pub qc_staff: ResourceId,
    pub histopathologist: ResourceId,
    pub bone_station: ResourceId,
    pub processing_machine: ResourceId,
    pub staining_machine: ResourceId,
    pub coverslip_machine: ResourceId,
    pub scanning_machine_regular: ResourceId,
    pub scanning_machine_megas: ResourceId,
}

/// Every task-duration distribution (spec §6), converted from
/// [`TaskDurationsInfo`] into the runtime [`hpath_kernel::rng::Duration`]
/// the pipeline samples from.
pub struct TaskDurations {
    pub receive_and_sort: Duration,
    pub pre_booking_in_investigation: Duration,
    pub booking_in_internal: Duration,
    pub booking_in_external: Duration,
    pub booking_in_investigation_internal_easy: Duration,
    pub booking_in_investigation_internal_hard: Duration,
    pub booking_in_investigation_external: Duration,
    pub cut_up_bms: Duration,
    pub cut_up_pool: Duration,
    pub cut_up_large_specimens: Duration,
    pub load_bone_station: Duration,
    pub decalc: Duration,
    pub unload_bone_station: Duration,
    pub load_into_decalc_oven: Duration,
    pub unload_from_decalc_oven: Duration,
    pub load_processing_machine: Duration,
    pub unload_processing_machine: Duration,
    pub processing_urgent: Duration,
    pub processing_small_surgicals: Duration,
    pub processing_large_surgicals: Duration,
    pub processing_megas: Duration,
    pub embedding: Duration,
    pub embedding_cooldown: Duration,
    pub block_trimming: Duration,
    pub microtomy_serials: Duration,
    pub microtomy_levels: Duration,
    pub microtomy_larges: Duration,
    pub microtomy_megas: Duration,
    pub load_staining_machine_regular: Duration,
    pub load_staining_machine_megas: Duration,
    pub staining_regular: Duration,
    pub staining_megas: Duration,
    pub unload_staining_machine_regular: Duration,
    pub unload_staining_machine_megas: Duration,
    pub load_coverslip_machine_regular: Duration,
    pub coverslip_regular: Duration,
    pub coverslip_megas: Duration,
    pub unload_coverslip_machine_regular: Duration,
    pub labelling: Duration,
    pub load_scanning_machine_regular: Duration,
    pub load_scanning_machine_megas: Duration,
    pub scanning_regular: Duration,
    pub scanning_megas: Duration,
    pub unload_scanning_machine_regular: Duration,
    pub unload_scanning_machine_megas: Duration,
    pub block_and_quality_check: Duration,
    pub assign_histopathologist: Duration,
    pub write_report: Duration,
}

/// Global probabilities and block/slide count distributions (spec §6),
/// converted from [`GlobalVars`] into runtime [`IntDistribution`]s.
pub struct RuntimeGlobals {
    pub prob_internal: f64,
    pub prob_urgent_cancer: f64,
    pub prob_urgent_non_cancer: f64,
    pub prob_priority_cancer: f64,
    pub prob_priority_non_cancer: f64,
    pub prob_prebook: f64,
    pub prob_invest_easy: f64,
    pub prob_invest_hard: f64,
    pub prob_invest_external: f64,
    pub prob_bms_cutup: f64,
    pub prob_bms_cutup_urgent: f64,
    pub prob_large_cutup: f64,
    pub prob_large_cutup_urgent: f64,
    pub prob_pool_cutup: f64,
    pub prob_pool_cutup_urgent: f64,
    pub prob_mega_blocks: f64,
    pub prob_decalc_bone: f64,
    pub prob_decalc_oven: f64,
    pub prob_microtomy_levels: f64,
    pub num_blocks_large_surgical: IntDistribution,
    pub num_blocks_mega: IntDistribution,
    pub num_slides_larges: IntDistribution,
    pub num_slides_levels: IntDistribution,
    pub num_slides_megas: IntDistribution,
    pub num_slides_serials: IntDistribution,
}

/// A WIP level counter paired with the [`Monitor`] recording its history
/// (spec §4.10 "WIP by stage"); `inc`/`dec` keep the two in lockstep so
/// callers never hand-compute the running level.
#[derive(Default)]
pub struct WipCounter {
    level: i64,
    monitor: Monitor,
}

impl WipCounter {
    fn new() -> Self {
        let mut monitor = Monitor::new();
        monitor.record(0.0, 0.0);
        Self { level: 0, monitor }
    }

    pub fn inc(&mut self, t: f64) {
        self.level += 1;
        self.monitor.record(t, self.level as f64);
    }

    pub fn dec(&mut self, t: f64) {
        self.level -= 1;
        self.monitor.record(t, self.level as f64);
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }
}

/// Work-in-progress counters, one per pipeline stage plus an overall total
/// (spec §4.10), mirroring `original_source/hpath/model.py::Wips`.
pub struct Wips {
    pub total: RefCell<WipCounter>,
    pub in_reception: RefCell<WipCounter>,
    pub in_cut_up: RefCell<WipCounter>,
    pub in_processing: RefCell<WipCounter>,
    pub in_microtomy: RefCell<WipCounter>,
    pub in_staining: RefCell<WipCounter>,
    pub in_labelling: RefCell<WipCounter>,
    pub in_scanning: RefCell<WipCounter>,
    pub in_qc: RefCell<WipCounter>,
    pub in_reporting: RefCell<WipCounter>,
}

impl Wips {
    fn new() -> Self {
        Self {
            total: RefCell::new(WipCounter::new()),
            in_reception: RefCell::new(WipCounter::new()),
            in_cut_up: RefCell::new(WipCounter::new()),
            in_processing: RefCell::new(WipCounter::new()),
            in_microtomy: RefCell::new(WipCounter::new()),
            in_staining: RefCell::new(WipCounter::new()),
            in_labelling: RefCell::new(WipCounter::new()),
            in_scanning: RefCell::new(WipCounter::new()),
            in_qc: RefCell::new(WipCounter::new()),
            in_reporting: RefCell::new(WipCounter::new()),
        }
    }

    /// `(field_name, &WipCounter)` pairs, in the order KPI output reports
    /// them.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &RefCell<WipCounter>)> {
        [
            ("reception", &self.in_reception),
            ("cut_up", &self.in_cut_up),
            ("processing", &self.in_processing),
            ("microtomy", &self.in_microtomy),
            ("staining", &self.in_staining),
            ("labelling", &self.in_labelling),
            ("scanning", &self.in_scanning),
            ("qc", &self.in_qc),
            ("reporting", &self.in_reporting),
        ]
        .into_iter()
    }
}

fn to_distribution(info: DistributionInfo) -> Result<Duration, SimError> {
    use crate::config::DistributionKind;
    let dist = match info.kind {
        DistributionKind::Constant => Distribution::constant(info.mode),
        DistributionKind::Triangular => Distribution::triangular(info.low, info.mode, info.high)?,
        DistributionKind::Pert => Distribution::pert(info.low, info.mode, info.high)?,
    };
    Ok(Duration::new(dist, info.time_unit))
}

fn to_int_distribution(info: IntDistributionInfo) -> Result<IntDistribution, SimError> {
    use crate::config::IntDistributionKind;
    Ok(match info.kind {
        IntDistributionKind::Constant => IntDistribution::constant(info.mode),
        IntDistributionKind::Triangular => IntDistribution::triangular(info.low, info.mode, info.high)?,
        IntDistributionKind::Pert => IntDistribution::pert(info.low, info.mode, info.high)?,
    })
}

fn build_task_durations(info: &TaskDurationsInfo) -> Result<TaskDurations, SimError> {
    Ok(TaskDurations {
        receive_and_sort: to_distribution(info.receive_and_sort)?,
        pre_booking_in_investigation: to_distribution(info.pre_booking_in_investigation)?,
        booking_in_internal: to_distribution(info.booking_in_internal)?,
        booking_in_external: to_distribution(info.booking_in_external)?,
        booking_in_investigation_internal_easy: to_distribution(info.booking_in_investigation_internal_easy)?,
        booking_in_investigation_internal_hard: to_distribution(info.booking_in_investigation_internal_hard)?,
        booking_in_investigation_external: to_distribution(info.booking_in_investigation_external)?,
        cut_up_bms: to_distribution(info.cut_up_bms)?,
        cut_up_pool: to_distribution(info.cut_up_pool)?,
        cut_up_large_specimens: to_distribution(info.cut_up_large_specimens)?,
        load_bone_station: to_distribution(info.load_bone_station)?,
        decalc: to_distribution(info.decalc)?,
        unload_bone_station: to_distribution(info.unload_bone_station)?,
        load_into_decalc_oven: to_distribution(info.load_into_decalc_oven)?,
        unload_from_decalc_oven: to_distribution(info.unload_from_decalc_oven)?,
        load_processing_machine: to_distribution(info.load_processing_machine)?,
        unload_processing_machine: to_distribution(info.unload_processing_machine)?,
        processing_urgent: to_distribution(info.processing_urgent)?,
        processing_small_surgicals: to_distribution(info.processing_small_surgicals)?,
        processing_large_surgicals: to_distribution(info.processing_large_surgicals)?,
        processing_megas: to_distribution(info.processing_megas)?,
        embedding: to_distribution(info.embedding)?,
        embedding_cooldown: to_distribution(info.embedding_cooldown)?,
        block_trimming: to_distribution(info.block_trimming)?,
        microtomy_serials: to_distribution(info.microtomy_serials)?,
        microtomy_levels: to_distribution(info.microtomy_levels)?,
        microtomy_larges: to_distribution(info.microtomy_larges)?,
        microtomy_megas: to_distribution(info.microtomy_megas)?,
        load_staining_machine_regular: to_distribution(info.load_staining_machine_regular)?,
        load_staining_machine_megas: to_distribution(info.load_staining_machine_megas)?,
        staining_regular: to_distribution(info.staining_regular)?,
        staining_megas: to_distribution(info.staining_megas)?,
        unload_staining_machine_regular: to_distribution(info.unload_staining_machine_regular)?,
        unload_staining_machine_megas: to_distribution(info.unload_staining_machine_megas)?,
        load_coverslip_machine_regular: to_distribution(info.load_coverslip_machine_regular)?,
        coverslip_regular: to_distribution(info.coverslip_regular)?,
        coverslip_megas: to_distribution(info.coverslip_megas)?,
        unload_coverslip_machine_regular: to_distribution(info.unload_coverslip_machine_regular)?,
        labelling: to_distribution(info.labelling)?,
        load_scanning_machine_regular: to_distribution(info.load_scanning_machine_regular)?,
        load_scanning_machine_megas: to_distribution(info.load_scanning_machine_megas)?,
        scanning_regular: to_distribution(info.scanning_regular)?,
        scanning_megas: to_distribution(info.scanning_megas)?,
        unload_scanning_machine_regular: to_distribution(info.unload_scanning_machine_regular)?,
        unload_scanning_machine_megas: to_distribution(info.unload_scanning_machine_megas)?,
        block_and_quality_check: to_distribution(info.block_and_quality_check)?,
        assign_histopathologist: to_distribution(info.assign_histopathologist)?,
        write_report: to_distribution(info.write_report)?,
    })
}

fn build_globals(info: &GlobalVars) -> Result<RuntimeGlobals, SimError> {
    Ok(RuntimeGlobals {
        prob_internal: info.prob_internal,
        prob_urgent_cancer: info.prob_urgent_cancer,
        prob_urgent_non_cancer: info.prob_urgent_non_cancer,
        prob_priority_cancer: info.prob_priority_cancer,
        prob_priority_non_cancer: info.prob_priority_non_cancer,
        prob_prebook: info.prob_prebook,
        prob_invest_easy: info.prob_invest_easy,
        prob_invest_hard: info.prob_invest_hard,
        prob_invest_external: info.prob_invest_external,
        prob_bms_cutup: info.prob_bms_cutup,
        prob_bms_cutup_urgent: info.prob_bms_cutup_urgent,
        prob_large_cutup: info.prob_large_cutup,
        prob_large_cutup_urgent: info.prob_large_cutup_urgent,
        prob_pool_cutup: info.prob_pool_cutup,
        prob_pool_cutup_urgent: info.prob_pool_cutup_urgent,
        prob_mega_blocks: info.prob_mega_blocks,
        prob_decalc_bone: info.prob_decalc_bone,
        prob_decalc_oven: info.prob_decalc_oven,
        prob_microtomy_levels: info.prob_microtomy_levels,
        num_blocks_large_surgical: to_int_distribution(info.num_blocks_large_surgical)?,
        num_blocks_mega: to_int_distribution(info.num_blocks_mega)?,
        num_slides_larges: to_int_distribution(info.num_slides_larges)?,
        num_slides_levels: to_int_distribution(info.num_slides_levels)?,
        num_slides_megas: to_int_distribution(info.num_slides_megas)?,
        num_slides_serials: to_int_distribution(info.num_slides_serials)?,
    })
}

fn register_resources(scheduler: &mut Scheduler, info: &ResourcesInfo) -> Resources {
    let r = |name: &str| -> ResourceId { scheduler.register_resource(name, 0) };
    Resources {
        booking_in_staff: r(&info.booking_in_staff.name),
        bms: r(&info.bms.name),
        cut_up_assistant: r(&info.cut_up_assistant.name),
        processing_room_staff: r(&info.processing_room_staff.name),
        microtomy_staff: r(&info.microtomy_staff.name),
        staining_staff: r(&info.staining_staff.name),
        scanning_staff: r(&info.scanning_staff.name),
        qc_staff: r(&info.qc_staff.name),
        histopathologist: r(&info.histopathologist.name),
        bone_station: r(&info.bone_station.name),
        processing_machine: r(&info.processing_machine.name),
        staining_machine: r(&info.staining_machine.name),
        coverslip_machine: r(&info.coverslip_machine.name),
        scanning_machine_regular: r(&info.scanning_machine_regular.name),
        scanning_machine_megas: r(&info.scanning_machine_megas.name),
    }
}

impl Resources {
    /// `(field_name, ResourceId)` pairs in the same order as
    /// [`ResourcesInfo::iter`], used for KPI extraction.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, ResourceId)> {
        [
            ("booking_in_staff", self.booking_in_staff),
            ("bms", self.bms),
            ("cut_up_assistant", self.cut_up_assistant),
            ("processing_room_staff", self.processing_room_staff),
            ("microtomy_staff", self.microtomy_staff),
            ("staining_staff", self.staining_staff),
            ("scanning_staff", self.scanning_staff),
            ("qc_staff", self.qc_staff),
            ("histopathologist", self.histopathologist),
            ("bone_station", self.bone_station),
            ("processing_machine", self.processing_machine),
            ("staining_machine", self.staining_machine),
            ("coverslip_machine", self.coverslip_machine),
            ("scanning_machine_regular", self.scanning_machine_regular),
            ("scanning_machine_megas", self.scanning_machine_megas),
        ]
        .into_iter()
    }
}

fn spawn_capacity_schedulers(scheduler: &mut Scheduler, info: &ResourcesInfo, resources: &Resources) {
    spawn_capacity_scheduler(scheduler, "cap/booking_in_staff", resources.booking_in_staff, info.booking_in_staff.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/bms", resources.bms, info.bms.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/cut_up_assistant", resources.cut_up_assistant, info.cut_up_assistant.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/processing_room_staff", resources.processing_room_staff, info.processing_room_staff.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/microtomy_staff", resources.microtomy_staff, info.microtomy_staff.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/staining_staff", resources.staining_staff, info.staining_staff.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/scanning_staff", resources.scanning_staff, info.scanning_staff.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/qc_staff", resources.qc_staff, info.qc_staff.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/histopathologist", resources.histopathologist, info.histopathologist.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/bone_station", resources.bone_station, info.bone_station.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/processing_machine", resources.processing_machine, info.processing_machine.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/staining_machine", resources.staining_machine, info.staining_machine.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/coverslip_machine", resources.coverslip_machine, info.coverslip_machine.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/scanning_machine_regular", resources.scanning_machine_regular, info.scanning_machine_regular.schedule.clone());
    spawn_capacity_scheduler(scheduler, "cap/scanning_machine_megas", resources.scanning_machine_megas, info.scanning_machine_megas.schedule.clone());
}

/// One simulation run: the fully-wired pipeline plus everything the KPI
/// layer needs to read back out (spec §2 component 7; §4.10).
pub struct Model {
    pub scheduler: Scheduler,
    pub entities: Rc<Entities>,
    pub resources: Rc<Resources>,
    pub wips: Rc<Wips>,
    pub completed_specimens: hpath_kernel::StoreId,
    pub sim_hours: f64,
}

impl Model {
    /// Build a fresh model from `config`, seeding its RNG stream with
    /// `seed` (spec §5 "Determinism": one seeded stream per run).
    pub fn new(config: &Config, seed: u64) -> Result<Self, SimError> {
        config.validate()?;

        let mut scheduler = Scheduler::new();
        let entities = Rc::new(Entities::new());
        let rng = Rc::new(RefCell::new(RngService::new(seed)));
        let resources = Rc::new(register_resources(&mut scheduler, &config.resources));
        let durations = Rc::new(build_task_durations(&config.task_durations)?);
        let globals = Rc::new(build_globals(&config.globals)?);
        let wips = Rc::new(Wips::new());

        spawn_capacity_schedulers(&mut scheduler, &config.resources, &resources);

        let completed_specimens = scheduler.register_store::<SpecimenId>("completed_specimens");

        let reception_store = pipeline::wire(
            &mut scheduler,
            Rc::clone(&entities),
            Rc::clone(&rng),
            Rc::clone(&resources),
            Rc::clone(&durations),
            Rc::clone(&globals),
            &config.batch_sizes,
            Rc::clone(&wips),
            completed_specimens,
        );

        spawn_arrival_generator(
            &mut scheduler,
            "arrivals/cancer",
            Rc::clone(&entities),
            Rc::clone(&rng),
            config.globals,
            Rc::new(config.arrival_schedules.cancer.clone()),
            true,
            reception_store,
        );
        spawn_arrival_generator(
            &mut scheduler,
            "arrivals/noncancer",
            Rc::clone(&entities),
            rng,
            config.globals,
            Rc::new(config.arrival_schedules.noncancer.clone()),
            false,
            reception_store,
        );

        Ok(Self {
            scheduler,
            entities,
            resources,
            wips,
            completed_specimens,
            sim_hours: config.sim_hours,
        })
    }

    /// Run to completion and extract KPIs (spec §2 component 9/10).
    pub fn run(mut self) -> Result<Report, SimError> {
        self.scheduler.run(self.sim_hours)?;
        Ok(Report::from_model(&self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::minimal_config;

    /// A config that actually generates traffic: [`minimal_config`] zeroes
    /// every arrival rate so it can assert NaN KPIs cheaply (spec §8
    /// boundary "zero arrival rate ... no specimens"); this gives every
    /// resource unit-capacity and 6-minute constant task durations, which
    /// keeps the bottleneck utilisation far below 1 at this arrival rate.
    fn busy_config() -> Config {
        let mut config = minimal_config();
        config.arrival_schedules.cancer.rates = vec![0.3; 168];
        config.arrival_schedules.noncancer.rates = vec![0.3; 168];
        config.sim_hours = 48.0;
        config
    }

    #[test]
    fn sim_hours_zero_dispatches_nothing() {
        let mut config = minimal_config();
        config.arrival_schedules.cancer.rates = vec![1.0; 168];
        config.sim_hours = 0.0;
        let mut model = Model::new(&config, 1).unwrap();
        model.scheduler.run(model.sim_hours).unwrap();
        let report = Report::from_model(&model);
        assert!(report.overall_tat.is_nan());
        assert_eq!(model.scheduler.store_items::<SpecimenId>(model.completed_specimens).len(), 0);
    }

    /// Exercises spec §8's quantified invariants end to end: every
    /// completed specimen's stage timestamps are monotonic, its block/slide
    /// counts match its own `num_blocks`/`num_slides` bookkeeping, and at
    /// least one specimen actually reaches `completed_specimens` (spec §8
    /// scenario family 1-3, generalised instead of pinned to one seed's
    /// exact TAT).
    #[test]
    fn full_pipeline_run_completes_specimens_with_consistent_invariants() {
        let config = busy_config();
        let mut model = Model::new(&config, 42).unwrap();
        model.scheduler.run(model.sim_hours).unwrap();
        let report = Report::from_model(&model);
        assert!(!report.overall_tat.is_nan(), "busy config should complete at least one specimen");

        let completed = model.scheduler.store_items::<SpecimenId>(model.completed_specimens);
        assert!(!completed.is_empty());

        for id in completed {
            let specimen = model.entities.specimen(id);
            let ts = specimen.timestamps;

            let stage_pairs = [
                (ts.reception_start, ts.reception_end),
                (ts.cutup_start, ts.cutup_end),
                (ts.processing_start, ts.processing_end),
                (ts.microtomy_start, ts.microtomy_end),
                (ts.staining_start, ts.staining_end),
                (ts.labelling_start, ts.labelling_end),
                (ts.scanning_start, ts.scanning_end),
                (ts.qc_start, ts.qc_end),
                (ts.report_start, ts.report_end),
            ];
            let mut chain = Vec::with_capacity(stage_pairs.len() * 2);
            for (start, end) in stage_pairs {
                let (start, end) = (start.expect("completed specimen has every stage start"), end.expect("completed specimen has every stage end"));
                assert!(end >= start, "stage end must not precede its own start: {start} .. {end}");
                chain.push(start);
                chain.push(end);
            }
            for pair in chain.windows(2) {
                assert!(pair[0] <= pair[1], "stage timestamps must be non-decreasing across the pipeline: {chain:?}");
            }

            assert_eq!(specimen.blocks.len(), specimen.num_blocks as usize);
            let mut total_slides = 0u32;
            for block_id in &specimen.blocks {
                let block = model.entities.block(*block_id);
                assert_eq!(block.slides.len(), block.num_slides as usize);
                total_slides += block.num_slides;
            }
            assert_eq!(total_slides, specimen.total_slides);
        }
    }

    #[test]
    fn determinism_same_seed_same_config_yields_identical_report_json() {
        let config = busy_config();
        let report_a = Model::new(&config, 99).unwrap().run().unwrap();
        let report_b = Model::new(&config, 99).unwrap().run().unwrap();
        let json_a = serde_json::to_string(&report_a).unwrap();
        let json_b = serde_json::to_string(&report_b).unwrap();
        assert_eq!(json_a, json_b, "same seed + config must reproduce byte-identical KPI output (spec §5 Determinism)");
    }
}
