//! Configuration schema for the histopathology lab model (spec §6 "External
//! Interfaces: Configuration input"), grounded on
//! `original_source/hpath/config.py`'s pydantic models. Field names follow
//! the original's `snake_case` attribute names directly; the pydantic
//! `Field(title=...)` bindings to named Excel ranges are a spreadsheet-
//! loading concern this crate does not carry (spec §1 Out-of-scope).

use hpath_common::error::ConfigError;
use hpath_common::time::TimeUnit;
use serde::{Deserialize, Serialize};

/// One of the 168 hourly arrival rates for a single pathway (cancer or
/// non-cancer), flattened column-major: index `24*day + hour` for
/// `day in 0..7, hour in 0..24` (`original_source/hpath/config.py`
/// `ArrivalSchedule.from_pd` uses `.to_numpy().flatten('F')` on a
/// `Hour x Day` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalSchedule {
    pub rates: Vec<f64>,
}

impl ArrivalSchedule {
    pub const LEN: usize = 168;

    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        if self.rates.len() != Self::LEN {
            return Err(ConfigError::WrongLength {
                field: label.to_string(),
                expected: Self::LEN,
                actual: self.rates.len(),
            });
        }
        if self.rates.iter().any(|r| *r < 0.0 || !r.is_finite()) {
            return Err(ConfigError::Invalid {
                field: label.to_string(),
                reason: "arrival rates must be finite and non-negative".into(),
            });
        }
        Ok(())
    }

    /// The rate in effect at simulated hour `t` (the arrival generator loops
    /// this schedule every 168 hours, spec §4.4).
    pub fn rate_at_hour(&self, hour_of_week: usize) -> f64 {
        self.rates[hour_of_week % Self::LEN]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalSchedules {
    pub cancer: ArrivalSchedule,
    pub noncancer: ArrivalSchedule,
}

/// A resource's weekly capacity grid: one flag per day of week, and 48
/// half-hourly allocations used on every day the flag is set (spec §4.3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchedule {
    pub day_flags: [bool; 7],
    pub allocation: [u32; 48],
}

impl ResourceSchedule {
    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        if self.allocation.iter().any(|a| *a > 10_000) {
            return Err(ConfigError::Invalid {
                field: label.to_string(),
                reason: "resource allocation implausibly large".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Staff,
    Machine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub schedule: ResourceSchedule,
}

/// The model's 15 named resources (spec §6), fixed staff/machine tags per
/// `original_source/hpath/model.py::Resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesInfo {
    pub booking_in_staff: ResourceInfo,
    pub bms: ResourceInfo,
    pub cut_up_assistant: ResourceInfo,
    pub processing_room_staff: ResourceInfo,
    pub microtomy_staff: ResourceInfo,
    pub staining_staff: ResourceInfo,
    pub scanning_staff: ResourceInfo,
    pub qc_staff: ResourceInfo,
    pub histopathologist: ResourceInfo,
    pub bone_station: ResourceInfo,
    pub processing_machine: ResourceInfo,
    pub staining_machine: ResourceInfo,
    pub coverslip_machine: ResourceInfo,
    pub scanning_machine_regular: ResourceInfo,
    pub scanning_machine_megas: ResourceInfo,
}

impl ResourcesInfo {
    /// Iterate `(field_name, &ResourceInfo)` pairs, in the fixed order used
    /// for resource registration and KPI output.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ResourceInfo)> {
        [
            ("booking_in_staff", &self.booking_in_staff),
            ("bms", &self.bms),
            ("cut_up_assistant", &self.cut_up_assistant),
            ("processing_room_staff", &self.processing_room_staff),
            ("microtomy_staff", &self.microtomy_staff),
            ("staining_staff", &self.staining_staff),
            ("scanning_staff", &self.scanning_staff),
            ("qc_staff", &self.qc_staff),
            ("histopathologist", &self.histopathologist),
            ("bone_station", &self.bone_station),
            ("processing_machine", &self.processing_machine),
            ("staining_machine", &self.staining_machine),
            ("coverslip_machine", &self.coverslip_machine),
            ("scanning_machine_regular", &self.scanning_machine_regular),
            ("scanning_machine_megas", &self.scanning_machine_megas),
        ]
        .into_iter()
    }
}

/// A continuous three-point task-duration distribution as read from
/// configuration, paired with its time unit (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionInfo {
    #[serde(rename = "type")]
    pub kind: DistributionKind,
    pub low: f64,
    pub mode: f64,
    pub high: f64,
    pub time_unit: TimeUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionKind {
    Constant,
    Triangular,
    #[serde(rename = "PERT")]
    Pert,
}

impl DistributionInfo {
    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        if self.kind != DistributionKind::Constant && !(self.low <= self.mode && self.mode <= self.high) {
            return Err(ConfigError::DistributionNotOrdered {
                name: label.to_string(),
                low: self.low,
                mode: self.mode,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// An integer-valued three-point distribution over counts, no time unit
/// (spec §4.7 `IntPERT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntDistributionInfo {
    #[serde(rename = "type")]
    pub kind: IntDistributionKind,
    pub low: i64,
    pub mode: i64,
    pub high: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntDistributionKind {
    Constant,
    #[serde(rename = "IntTriangular")]
    Triangular,
    #[serde(rename = "IntPERT")]
    Pert,
}

impl IntDistributionInfo {
    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        if self.kind != IntDistributionKind::Constant && !(self.low <= self.mode && self.mode <= self.high) {
            return Err(ConfigError::DistributionNotOrdered {
                name: label.to_string(),
                low: self.low as f64,
                mode: self.mode as f64,
                high: self.high as f64,
            });
        }
        Ok(())
    }
}

/// The ≈44 named task-duration distributions (spec §6), one per
/// `original_source/hpath/config.py::TaskDurationsInfo` field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskDurationsInfo {
    pub receive_and_sort: DistributionInfo,
    pub pre_booking_in_investigation: DistributionInfo,
    pub booking_in_internal: DistributionInfo,
    pub booking_in_external: DistributionInfo,
    pub booking_in_investigation_internal_easy: DistributionInfo,
    pub booking_in_investigation_internal_hard: DistributionInfo,
    pub booking_in_investigation_external: DistributionInfo,
    pub cut_up_bms: DistributionInfo,
    pub cut_up_pool: DistributionInfo,
    pub cut_up_large_specimens: DistributionInfo,
    pub load_bone_station: DistributionInfo,
    pub decalc: DistributionInfo,
    pub unload_bone_station: DistributionInfo,
    pub load_into_decalc_oven: DistributionInfo,
    pub unload_from_decalc_oven: DistributionInfo,
    pub load_processing_machine: DistributionInfo,
    pub unload_processing_machine: DistributionInfo,
    pub processing_urgent: DistributionInfo,
    pub processing_small_surgicals: DistributionInfo,
    pub processing_large_surgicals: DistributionInfo,
    pub processing_megas: DistributionInfo,
    pub embedding: DistributionInfo,
    pub embedding_cooldown: DistributionInfo,
    pub block_trimming: DistributionInfo,
    pub microtomy_serials: DistributionInfo,
    pub microtomy_levels: DistributionInfo,
    pub microtomy_larges: DistributionInfo,
    pub microtomy_megas: DistributionInfo,
    pub load_staining_machine_regular: DistributionInfo,
    pub load_staining_machine_megas: DistributionInfo,
    pub staining_regular: DistributionInfo,
    pub staining_megas: DistributionInfo,
    pub unload_staining_machine_regular: DistributionInfo,
    pub unload_staining_machine_megas: DistributionInfo,
    pub load_coverslip_machine_regular: DistributionInfo,
    pub coverslip_regular: DistributionInfo,
    pub coverslip_megas: DistributionInfo,
    pub unload_coverslip_machine_regular: DistributionInfo,
    pub labelling: DistributionInfo,
    pub load_scanning_machine_regular: DistributionInfo,
    pub load_scanning_machine_megas: DistributionInfo,
    pub scanning_regular: DistributionInfo,
    pub scanning_megas: DistributionInfo,
    pub unload_scanning_machine_regular: DistributionInfo,
    pub unload_scanning_machine_megas: DistributionInfo,
    pub block_and_quality_check: DistributionInfo,
    pub assign_histopathologist: DistributionInfo,
    pub write_report: DistributionInfo,
}

impl TaskDurationsInfo {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &DistributionInfo)> {
        macro_rules! fields {
            ($($name:ident),* $(,)?) => { [ $((stringify!($name), &self.$name)),* ] };
        }
        fields!(
            receive_and_sort,
            pre_booking_in_investigation,
            booking_in_internal,
            booking_in_external,
            booking_in_investigation_internal_easy,
            booking_in_investigation_internal_hard,
            booking_in_investigation_external,
            cut_up_bms,
            cut_up_pool,
            cut_up_large_specimens,
            load_bone_station,
            decalc,
            unload_bone_station,
            load_into_decalc_oven,
            unload_from_decalc_oven,
            load_processing_machine,
            unload_processing_machine,
            processing_urgent,
            processing_small_surgicals,
            processing_large_surgicals,
            processing_megas,
            embedding,
            embedding_cooldown,
            block_trimming,
            microtomy_serials,
            microtomy_levels,
            microtomy_larges,
            microtomy_megas,
            load_staining_machine_regular,
            load_staining_machine_megas,
            staining_regular,
            staining_megas,
            unload_staining_machine_regular,
            unload_staining_machine_megas,
            load_coverslip_machine_regular,
            coverslip_regular,
            coverslip_megas,
            unload_coverslip_machine_regular,
            labelling,
            load_scanning_machine_regular,
            load_scanning_machine_megas,
            scanning_regular,
            scanning_megas,
            unload_scanning_machine_regular,
            unload_scanning_machine_megas,
            block_and_quality_check,
            assign_histopathologist,
            write_report,
        )
        .into_iter()
    }
}

/// The 14 positive-integer batch sizes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSizes {
    pub deliver_reception_to_cut_up: u32,
    pub deliver_cut_up_to_processing: u32,
    pub deliver_processing_to_microtomy: u32,
    pub deliver_microtomy_to_staining: u32,
    pub deliver_staining_to_labelling: u32,
    pub deliver_labelling_to_scanning: u32,
    pub deliver_scanning_to_qc: u32,
    pub bone_station: u32,
    pub processing_regular: u32,
    pub processing_megas: u32,
    pub staining_regular: u32,
    pub staining_megas: u32,
    pub digital_scanning_regular: u32,
    pub digital_scanning_megas: u32,
}

impl BatchSizes {
    fn iter(&self) -> impl Iterator<Item = (&'static str, u32)> {
        macro_rules! fields {
            ($($name:ident),* $(,)?) => { [ $((stringify!($name), self.$name)),* ] };
        }
        fields!(
            deliver_reception_to_cut_up,
            deliver_cut_up_to_processing,
            deliver_processing_to_microtomy,
            deliver_microtomy_to_staining,
            deliver_staining_to_labelling,
            deliver_labelling_to_scanning,
            deliver_scanning_to_qc,
            bone_station,
            processing_regular,
            processing_megas,
            staining_regular,
            staining_megas,
            digital_scanning_regular,
            digital_scanning_megas,
        )
        .into_iter()
    }
}

/// Global probabilities and count distributions shared across stages (spec
/// §6), grounded on `original_source/hpath/config.py::Globals`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalVars {
    pub prob_internal: f64,
    pub prob_urgent_cancer: f64,
    pub prob_urgent_non_cancer: f64,
    pub prob_priority_cancer: f64,
    pub prob_priority_non_cancer: f64,
    pub prob_routine_cancer: f64,
    pub prob_routine_non_cancer: f64,
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
    pub num_blocks_large_surgical: IntDistributionInfo,
    pub num_blocks_mega: IntDistributionInfo,
    pub num_slides_larges: IntDistributionInfo,
    pub num_slides_levels: IntDistributionInfo,
    pub num_slides_megas: IntDistributionInfo,
    pub num_slides_serials: IntDistributionInfo,
}

impl GlobalVars {
    fn probabilities(&self) -> impl Iterator<Item = (&'static str, f64)> {
        macro_rules! fields {
            ($($name:ident),* $(,)?) => { [ $((stringify!($name), self.$name)),* ] };
        }
        fields!(
            prob_internal,
            prob_urgent_cancer,
            prob_urgent_non_cancer,
            prob_priority_cancer,
            prob_priority_non_cancer,
            prob_routine_cancer,
            prob_routine_non_cancer,
            prob_prebook,
            prob_invest_easy,
            prob_invest_hard,
            prob_invest_external,
            prob_bms_cutup,
            prob_bms_cutup_urgent,
            prob_large_cutup,
            prob_large_cutup_urgent,
            prob_pool_cutup,
            prob_pool_cutup_urgent,
            prob_mega_blocks,
            prob_decalc_bone,
            prob_decalc_oven,
            prob_microtomy_levels,
        )
        .into_iter()
    }

    fn int_distributions(&self) -> impl Iterator<Item = (&'static str, &IntDistributionInfo)> {
        [
            ("num_blocks_large_surgical", &self.num_blocks_large_surgical),
            ("num_blocks_mega", &self.num_blocks_mega),
            ("num_slides_larges", &self.num_slides_larges),
            ("num_slides_levels", &self.num_slides_levels),
            ("num_slides_megas", &self.num_slides_megas),
            ("num_slides_serials", &self.num_slides_serials),
        ]
        .into_iter()
    }
}

/// Top-level configuration document (spec §6 "Configuration input").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub arrival_schedules: ArrivalSchedules,
    pub resources: ResourcesInfo,
    pub task_durations: TaskDurationsInfo,
    pub batch_sizes: BatchSizes,
    pub globals: GlobalVars,
    pub sim_hours: f64,
    pub num_reps: u32,
    pub analysis_id: Option<i64>,
}

impl Config {
    /// Parse and validate a configuration document from JSON text (spec §6;
    /// spreadsheet loading is out of scope per spec §1).
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)
            .map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values, malformed probability groups, and wrong
    /// sequence lengths (spec §6 "Validation").
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arrival_schedules.cancer.validate("arrival_schedules.cancer")?;
        self.arrival_schedules.noncancer.validate("arrival_schedules.noncancer")?;

        for (name, info) in self.resources.iter() {
            info.schedule.validate(name)?;
        }

        for (name, dist) in self.task_durations.iter() {
            dist.validate(name)?;
        }

        for (name, size) in self.batch_sizes.iter() {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    field: name.to_string(),
                    reason: "batch size must be positive".into(),
                });
            }
        }

        for (name, p) in self.globals.probabilities() {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::ProbabilityOutOfRange {
                    name: name.to_string(),
                    value: p,
                });
            }
        }
        for (name, dist) in self.globals.int_distributions() {
            dist.validate(name)?;
        }

        // Probability groups that must each sum to <= 1 (spec §4.6 "Cut-up":
        // "two probabilities that must sum to ≤ 1").
        check_sum_le_one(
            "prob_invest_easy + prob_invest_hard",
            self.globals.prob_invest_easy + self.globals.prob_invest_hard,
        )?;
        check_sum_le_one(
            "prob_urgent_cancer + prob_priority_cancer",
            self.globals.prob_urgent_cancer + self.globals.prob_priority_cancer,
        )?;
        check_sum_le_one(
            "prob_urgent_non_cancer + prob_priority_non_cancer",
            self.globals.prob_urgent_non_cancer + self.globals.prob_priority_non_cancer,
        )?;
        check_sum_le_one(
            "prob_bms_cutup + prob_pool_cutup + prob_large_cutup",
            self.globals.prob_bms_cutup + self.globals.prob_pool_cutup + self.globals.prob_large_cutup,
        )?;
        check_sum_le_one(
            "prob_bms_cutup_urgent + prob_pool_cutup_urgent + prob_large_cutup_urgent",
            self.globals.prob_bms_cutup_urgent
                + self.globals.prob_pool_cutup_urgent
                + self.globals.prob_large_cutup_urgent,
        )?;

        if self.sim_hours < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "sim_hours".into(),
                min: 0.0,
                value: self.sim_hours,
            });
        }

        Ok(())
    }
}

fn check_sum_le_one(label: &str, sum: f64) -> Result<(), ConfigError> {
    if sum > 1.0 + 1e-9 {
        return Err(ConfigError::ProbabilityGroupExceedsOne {
            name: label.to_string(),
            sum,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// `check_sum_le_one` must accept exactly the sums at or below one
        /// and reject everything above it (spec §6 "Validation": "non-
        /// sum-to-<=1 probability groups where applicable").
        #[test]
        fn check_sum_le_one_accepts_iff_sum_is_at_most_one(sum in -10.0f64..10.0) {
            let result = check_sum_le_one("group", sum);
            if sum <= 1.0 + 1e-9 {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(matches!(result, Err(ConfigError::ProbabilityGroupExceedsOne { .. })));
            }
        }
    }

    fn const_dist(v: f64) -> DistributionInfo {
        DistributionInfo {
            kind: DistributionKind::Constant,
            low: v,
            mode: v,
            high: v,
            time_unit: TimeUnit::Hours,
        }
    }

    fn const_int(v: i64) -> IntDistributionInfo {
        IntDistributionInfo {
            kind: IntDistributionKind::Constant,
            low: v,
            mode: v,
            high: v,
        }
    }

    pub(crate) fn minimal_config() -> Config {
        let schedule = ResourceSchedule {
            day_flags: [true; 7],
            allocation: [1; 48],
        };
        let resource = |name: &str, kind: ResourceKind| ResourceInfo {
            name: name.to_string(),
            kind,
            schedule: schedule.clone(),
        };
        Config {
            arrival_schedules: ArrivalSchedules {
                cancer: ArrivalSchedule { rates: vec![0.0; 168] },
                noncancer: ArrivalSchedule { rates: vec![0.0; 168] },
            },
            resources: ResourcesInfo {
                booking_in_staff: resource("Booking-in staff", ResourceKind::Staff),
                bms: resource("BMS", ResourceKind::Staff),
                cut_up_assistant: resource("Cut-up assistant", ResourceKind::Staff),
                processing_room_staff: resource("Processing room staff", ResourceKind::Staff),
                microtomy_staff: resource("Microtomy staff", ResourceKind::Staff),
                staining_staff: resource("Staining staff", ResourceKind::Staff),
                scanning_staff: resource("Scanning staff", ResourceKind::Staff),
                qc_staff: resource("QC staff", ResourceKind::Staff),
                histopathologist: resource("Histopathologist", ResourceKind::Staff),
                bone_station: resource("Bone station", ResourceKind::Machine),
                processing_machine: resource("Processing machine", ResourceKind::Machine),
                staining_machine: resource("Staining machine", ResourceKind::Machine),
                coverslip_machine: resource("Coverslip machine", ResourceKind::Machine),
                scanning_machine_regular: resource("Scanning machine (regular)", ResourceKind::Machine),
                scanning_machine_megas: resource("Scanning machine (megas)", ResourceKind::Machine),
            },
            task_durations: TaskDurationsInfo {
                receive_and_sort: const_dist(0.1),
                pre_booking_in_investigation: const_dist(0.1),
                booking_in_internal: const_dist(0.1),
                booking_in_external: const_dist(0.1),
                booking_in_investigation_internal_easy: const_dist(0.1),
                booking_in_investigation_internal_hard: const_dist(0.1),
                booking_in_investigation_external: const_dist(0.1),
                cut_up_bms: const_dist(0.1),
                cut_up_pool: const_dist(0.1),
                cut_up_large_specimens: const_dist(0.1),
                load_bone_station: const_dist(0.1),
                decalc: const_dist(0.1),
                unload_bone_station: const_dist(0.1),
                load_into_decalc_oven: const_dist(0.1),
                unload_from_decalc_oven: const_dist(0.1),
                load_processing_machine: const_dist(0.1),
                unload_processing_machine: const_dist(0.1),
                processing_urgent: const_dist(0.1),
                processing_small_surgicals: const_dist(0.1),
                processing_large_surgicals: const_dist(0.1),
                processing_megas: const_dist(0.1),
                embedding: const_dist(0.1),
                embedding_cooldown: const_dist(0.1),
                block_trimming: const_dist(0.1),
                microtomy_serials: const_dist(0.1),
                microtomy_levels: const_dist(0.1),
                microtomy_larges: const_dist(0.1),
                microtomy_megas: const_dist(0.1),
                load_staining_machine_regular: const_dist(0.1),
                load_staining_machine_megas: const_dist(0.1),
                staining_regular: const_dist(0.1),
                staining_megas: const_dist(0.1),
                unload_staining_machine_regular: const_dist(0.1),
                unload_staining_machine_megas: const_dist(0.1),
                load_coverslip_machine_regular: const_dist(0.1),
                coverslip_regular: const_dist(0.1),
                coverslip_megas: const_dist(0.1),
                unload_coverslip_machine_regular: const_dist(0.1),
                labelling: const_dist(0.1),
                load_scanning_machine_regular: const_dist(0.1),
                load_scanning_machine_megas: const_dist(0.1),
                scanning_regular: const_dist(0.1),
                scanning_megas: const_dist(0.1),
                unload_scanning_machine_regular: const_dist(0.1),
                unload_scanning_machine_megas: const_dist(0.1),
                block_and_quality_check: const_dist(0.1),
                assign_histopathologist: const_dist(0.1),
                write_report: const_dist(0.1),
            },
            batch_sizes: BatchSizes {
                deliver_reception_to_cut_up: 1,
                deliver_cut_up_to_processing: 1,
                deliver_processing_to_microtomy: 1,
                deliver_microtomy_to_staining: 1,
                deliver_staining_to_labelling: 1,
                deliver_labelling_to_scanning: 1,
                deliver_scanning_to_qc: 1,
                bone_station: 1,
                processing_regular: 1,
                processing_megas: 1,
                staining_regular: 1,
                staining_megas: 1,
                digital_scanning_regular: 1,
                digital_scanning_megas: 1,
            },
            globals: GlobalVars {
                prob_internal: 0.5,
                prob_urgent_cancer: 0.1,
                prob_urgent_non_cancer: 0.1,
                prob_priority_cancer: 0.1,
                prob_priority_non_cancer: 0.1,
                prob_routine_cancer: 0.8,
                prob_routine_non_cancer: 0.8,
                prob_prebook: 0.1,
                prob_invest_easy: 0.1,
                prob_invest_hard: 0.1,
                prob_invest_external: 0.1,
                prob_bms_cutup: 0.5,
                prob_bms_cutup_urgent: 0.5,
                prob_large_cutup: 0.2,
                prob_large_cutup_urgent: 0.2,
                prob_pool_cutup: 0.3,
                prob_pool_cutup_urgent: 0.3,
                prob_mega_blocks: 0.1,
                prob_decalc_bone: 0.1,
                prob_decalc_oven: 0.1,
                prob_microtomy_levels: 0.5,
                num_blocks_large_surgical: const_int(2),
                num_blocks_mega: const_int(1),
                num_slides_larges: const_int(3),
                num_slides_levels: const_int(3),
                num_slides_megas: const_int(3),
                num_slides_serials: const_int(3),
            },
            sim_hours: 24.0,
            num_reps: 1,
            analysis_id: None,
        }
    }

    #[test]
    fn minimal_config_validates() {
        minimal_config().validate().unwrap();
    }

    #[test]
    fn wrong_arrival_schedule_length_is_rejected() {
        let mut cfg = minimal_config();
        cfg.arrival_schedules.cancer.rates.pop();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::WrongLength { .. }));
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let mut cfg = minimal_config();
        cfg.globals.prob_internal = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn probability_group_over_one_is_rejected() {
        let mut cfg = minimal_config();
        cfg.globals.prob_invest_easy = 0.9;
        cfg.globals.prob_invest_hard = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut cfg = minimal_config();
        cfg.batch_sizes.bone_station = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_round_trip() {
        let cfg = minimal_config();
        let text = serde_json::to_string(&cfg).unwrap();
        let parsed = Config::from_json(&text).unwrap();
        assert_eq!(cfg, parsed);
    }
}
