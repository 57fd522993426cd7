//! KPI extraction: turns a completed [`crate::model::Model`] run into a
//! [`Report`] (spec §4.8 "KPI extraction"), grounded on
//! `original_source/hpath/kpis.py` and `original_source/hpath/chart_datatypes.py`.
//!
//! The source's `Report.fake_min_max()` synthesizes a placeholder `+-10%`
//! variance band from a single replication. This workspace instead computes
//! real min/max bands across a scenario's `num_reps` replications in
//! [`Report::from_replications`], leaving the `_min`/`_max` fields `None`
//! when only one replication ran (DESIGN.md Open Question e).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::entity::StageTimestamps;
use crate::model::Model;

/// Turnaround-time progress distribution, keyed by day count (spec §4.8
/// `progress`/`lab_progress`): the proportion of completed specimens whose
/// turnaround time fell under that many days.
pub type Progress = BTreeMap<u32, f64>;

const PROGRESS_DAYS: [u32; 4] = [7, 10, 12, 21];
const LAB_PROGRESS_DAYS: [u32; 1] = [3];

/// Pipeline order for `tat_by_stage`, matching
/// [`StageTimestamps::stage_durations`].
const STAGE_ORDER: [&str; 9] = [
    "reception", "cutup", "processing", "microtomy", "staining", "labelling", "scanning", "qc", "reporting",
];

/// An x-axis value: numeric for a time series, a label for a per-category
/// bar (e.g. a resource or stage name) (spec §6 `ChartData.x`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartX {
    Num(f64),
    Label(String),
}

impl From<f64> for ChartX {
    fn from(v: f64) -> Self {
        ChartX::Num(v)
    }
}

impl From<&str> for ChartX {
    fn from(v: &str) -> Self {
        ChartX::Label(v.to_string())
    }
}

impl From<String> for ChartX {
    fn from(v: String) -> Self {
        ChartX::Label(v)
    }
}

/// One data series, JSON-compatible with the `digital-twin` frontend's
/// `ChartData` (spec §6): a bar chart (string `x`) or a single line
/// (numeric `x`).
#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    pub x: Vec<ChartX>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ymin: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ymax: Option<Vec<f64>>,
}

impl ChartData {
    fn new(x: Vec<ChartX>, y: Vec<f64>) -> Self {
        Self { x, y, ymin: None, ymax: None }
    }
}

/// Several aligned data series sharing one numeric x-axis (spec §6
/// `MultiChartData`): used for hourly time series broken out by stage or
/// resource.
#[derive(Debug, Clone, Serialize)]
pub struct MultiChartData {
    pub x: Vec<f64>,
    pub y: Vec<Vec<f64>>,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ymin: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ymax: Option<Vec<Vec<f64>>>,
}

/// A single run's (or scenario's) KPI summary, mirroring
/// `original_source/hpath/kpis.py::Report` field-for-field.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub overall_tat: f64,
    pub lab_tat: f64,
    pub progress: Progress,
    pub lab_progress: Progress,
    pub tat_by_stage: ChartData,
    pub resource_allocation: BTreeMap<String, ChartData>,
    pub wip_by_stage: MultiChartData,
    pub utilization_by_resource: ChartData,
    pub q_length_by_resource: ChartData,
    pub hourly_utilization_by_resource: MultiChartData,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_tat_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_tat_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_tat_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_tat_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_min: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_max: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_progress_min: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_progress_max: Option<Progress>,
}

impl Report {
    /// Extract every KPI from a model that has finished [`Scheduler::run`]
    /// (spec §2 component 10), reading entities, resources, and WIP
    /// counters back out of `model`.
    ///
    /// [`Scheduler::run`]: hpath_kernel::Scheduler::run
    pub fn from_model(model: &Model) -> Report {
        let timestamps = completed_timestamps(model);
        Report {
            overall_tat: overall_tat(&timestamps),
            lab_tat: lab_tat(&timestamps),
            progress: progress_dist(&timestamps, &PROGRESS_DAYS, |t| t.report_end),
            lab_progress: progress_dist(&timestamps, &LAB_PROGRESS_DAYS, |t| t.qc_end),
            tat_by_stage: tat_by_stage(&timestamps),
            resource_allocation: resource_allocation(model),
            wip_by_stage: wip_by_stage(model),
            utilization_by_resource: utilization_by_resource(model),
            q_length_by_resource: q_length_by_resource(model),
            hourly_utilization_by_resource: hourly_utilization_by_resource(model),
            overall_tat_min: None,
            overall_tat_max: None,
            lab_tat_min: None,
            lab_tat_max: None,
            progress_min: None,
            progress_max: None,
            lab_progress_min: None,
            lab_progress_max: None,
        }
    }

    /// Combine one scenario's per-replication reports into a single report:
    /// scalar and series fields are averaged across replications, and when
    /// more than one replication ran, `_min`/`_max` bands record the real
    /// spread (see module docs; DESIGN.md Open Question e).
    ///
    /// `resource_allocation` is carried over from the first replication
    /// unchanged: the capacity schedule is a deterministic function of
    /// configuration, not of the RNG stream, so every replication of one
    /// scenario produces an identical series.
    pub fn from_replications(reports: &[Report]) -> Report {
        assert!(!reports.is_empty(), "from_replications requires at least one report");
        if reports.len() == 1 {
            return reports[0].clone();
        }

        let mut merged = reports[0].clone();

        merged.overall_tat = mean(reports.iter().map(|r| r.overall_tat));
        merged.overall_tat_min = reports.iter().map(|r| r.overall_tat).reduce(f64::min);
        merged.overall_tat_max = reports.iter().map(|r| r.overall_tat).reduce(f64::max);

        merged.lab_tat = mean(reports.iter().map(|r| r.lab_tat));
        merged.lab_tat_min = reports.iter().map(|r| r.lab_tat).reduce(f64::min);
        merged.lab_tat_max = reports.iter().map(|r| r.lab_tat).reduce(f64::max);

        merged.progress = average_progress(reports.iter().map(|r| &r.progress));
        merged.progress_min = Some(elementwise_progress(reports.iter().map(|r| &r.progress), f64::min));
        merged.progress_max = Some(elementwise_progress(reports.iter().map(|r| &r.progress), f64::max));

        merged.lab_progress = average_progress(reports.iter().map(|r| &r.lab_progress));
        merged.lab_progress_min = Some(elementwise_progress(reports.iter().map(|r| &r.lab_progress), f64::min));
        merged.lab_progress_max = Some(elementwise_progress(reports.iter().map(|r| &r.lab_progress), f64::max));

        merged.tat_by_stage = average_chart(reports.iter().map(|r| &r.tat_by_stage));
        merged.utilization_by_resource = average_chart(reports.iter().map(|r| &r.utilization_by_resource));
        merged.q_length_by_resource = average_chart(reports.iter().map(|r| &r.q_length_by_resource));
        merged.wip_by_stage = average_multichart(reports.iter().map(|r| &r.wip_by_stage));
        merged.hourly_utilization_by_resource =
            average_multichart(reports.iter().map(|r| &r.hourly_utilization_by_resource));

        merged
    }
}

fn completed_timestamps(model: &Model) -> Vec<StageTimestamps> {
    model
        .scheduler
        .store_items::<crate::entity::SpecimenId>(model.completed_specimens)
        .into_iter()
        .map(|id| model.entities.specimen(id).timestamps)
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Overall mean turnaround time: `report_end - reception_start` (spec §4.8).
fn overall_tat(timestamps: &[StageTimestamps]) -> f64 {
    mean(timestamps.iter().filter_map(|t| Some(t.report_end? - t.reception_start?)))
}

/// Mean lab turnaround time: `qc_end - reception_start` (spec §4.8).
fn lab_tat(timestamps: &[StageTimestamps]) -> f64 {
    mean(timestamps.iter().filter_map(|t| Some(t.qc_end? - t.reception_start?)))
}

/// The proportion of specimens whose `end_field(ts) - reception_start` fell
/// under each of `days`, used for both `progress` and `lab_progress`.
fn progress_dist(
    timestamps: &[StageTimestamps],
    days: &[u32],
    end_field: impl Fn(&StageTimestamps) -> Option<f64>,
) -> Progress {
    let tats: Vec<f64> = timestamps
        .iter()
        .filter_map(|t| Some(end_field(t)? - t.reception_start?))
        .collect();
    days.iter()
        .map(|&d| {
            let threshold = d as f64 * 24.0;
            let p = if tats.is_empty() {
                f64::NAN
            } else {
                tats.iter().filter(|&&tat| tat < threshold).count() as f64 / tats.len() as f64
            };
            (d, p)
        })
        .collect()
}

/// Mean duration of each of the nine pipeline stages, in pipeline order
/// (spec §4.8 `tat_by_stage`).
fn tat_by_stage(timestamps: &[StageTimestamps]) -> ChartData {
    let mut totals: BTreeMap<&'static str, (f64, usize)> = BTreeMap::new();
    for ts in timestamps {
        for (stage, duration) in ts.stage_durations() {
            let entry = totals.entry(stage).or_insert((0.0, 0));
            entry.0 += duration;
            entry.1 += 1;
        }
    }
    let mut x = Vec::new();
    let mut y = Vec::new();
    for stage in STAGE_ORDER {
        if let Some(&(sum, n)) = totals.get(stage) {
            x.push(ChartX::from(stage));
            y.push(sum / n as f64);
        }
    }
    ChartData::new(x, y)
}

/// Hourly-resampled WIP for each pipeline stage (spec §4.8 `wip_by_stage`).
fn wip_by_stage(model: &Model) -> MultiChartData {
    let hours = model.sim_hours.ceil().max(0.0) as usize;
    let x: Vec<f64> = (0..hours).map(|h| h as f64).collect();
    let mut labels = Vec::new();
    let mut y = Vec::new();
    for (name, wip) in model.wips.iter() {
        labels.push(name.to_string());
        y.push(wip.borrow().monitor().resample_hourly(model.sim_hours));
    }
    MultiChartData { x, y, labels, ymin: None, ymax: None }
}

/// Mean utilisation (`claimed / capacity`) of each resource over the run
/// (spec §4.8 `utilisation_by_resource`).
fn utilization_by_resource(model: &Model) -> ChartData {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (_, id) in model.resources.iter() {
        let res = model.scheduler.resource(id);
        x.push(ChartX::from(res.name.clone()));
        let capacity_mean = res.capacity_monitor.mean(0.0, model.sim_hours);
        let claimed_mean = res.claimed_monitor.mean(0.0, model.sim_hours);
        y.push(claimed_mean / capacity_mean);
    }
    ChartData::new(x, y)
}

/// Mean queue length (`waiters / capacity`) of each resource over the run
/// (spec §4.8 `q_length_by_resource`).
fn q_length_by_resource(model: &Model) -> ChartData {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (_, id) in model.resources.iter() {
        let res = model.scheduler.resource(id);
        x.push(ChartX::from(res.name.clone()));
        let capacity_mean = res.capacity_monitor.mean(0.0, model.sim_hours);
        let queue_mean = model.scheduler.queue_monitor(id).mean(0.0, model.sim_hours);
        y.push(queue_mean / capacity_mean);
    }
    ChartData::new(x, y)
}

/// Hourly-resampled utilisation for each resource (spec §4.8
/// `hourly_utilisation_by_resource`).
fn hourly_utilization_by_resource(model: &Model) -> MultiChartData {
    let hours = model.sim_hours.ceil().max(0.0) as usize;
    let x: Vec<f64> = (0..hours).map(|h| h as f64).collect();
    let mut labels = Vec::new();
    let mut y = Vec::new();
    for (_, id) in model.resources.iter() {
        let res = model.scheduler.resource(id);
        labels.push(res.name.clone());
        y.push(res.claimed_monitor.resample_hourly(model.sim_hours));
    }
    MultiChartData { x, y, labels, ymin: None, ymax: None }
}

/// The allocation time series of each resource, with same-timestamp
/// duplicates collapsed to the last value (spec §4.8 `resource_allocation`;
/// `original_source`'s `allocation_timeseries` does the same via
/// `groupby('t').tail(1)`, to drop the spurious duplicate a capacity change
/// at the exact simulation end time can leave behind).
fn resource_allocation(model: &Model) -> BTreeMap<String, ChartData> {
    let mut out = BTreeMap::new();
    for (_, id) in model.resources.iter() {
        let res = model.scheduler.resource(id);
        let samples = dedup_last_per_timestamp(res.capacity_monitor.samples());
        let x = samples.iter().map(|&(t, _)| ChartX::from(t)).collect();
        let y = samples.iter().map(|&(_, v)| v).collect();
        out.insert(res.name.clone(), ChartData::new(x, y));
    }
    out
}

fn dedup_last_per_timestamp(samples: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out: Vec<(f64, f64)> = Vec::new();
    for &(t, v) in samples {
        match out.last_mut() {
            Some(last) if (last.0 - t).abs() < 1e-12 => last.1 = v,
            _ => out.push((t, v)),
        }
    }
    out
}

fn average_progress<'a>(reports: impl Iterator<Item = &'a Progress>) -> Progress {
    let mut totals: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for progress in reports {
        for (&day, &value) in progress {
            let entry = totals.entry(day).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    totals.into_iter().map(|(day, (sum, n))| (day, sum / n as f64)).collect()
}

fn elementwise_progress<'a>(reports: impl Iterator<Item = &'a Progress>, f: fn(f64, f64) -> f64) -> Progress {
    let mut acc: Progress = BTreeMap::new();
    for progress in reports {
        for (&day, &value) in progress {
            acc.entry(day).and_modify(|existing| *existing = f(*existing, value)).or_insert(value);
        }
    }
    acc
}

fn average_chart<'a>(charts: impl Iterator<Item = &'a ChartData>) -> ChartData {
    let charts: Vec<&ChartData> = charts.collect();
    let len = charts[0].y.len();
    let mut y = vec![0.0; len];
    let mut ymin = vec![f64::INFINITY; len];
    let mut ymax = vec![f64::NEG_INFINITY; len];
    for chart in &charts {
        for i in 0..len {
            y[i] += chart.y[i];
            ymin[i] = ymin[i].min(chart.y[i]);
            ymax[i] = ymax[i].max(chart.y[i]);
        }
    }
    let n = charts.len() as f64;
    for v in &mut y {
        *v /= n;
    }
    ChartData { x: charts[0].x.clone(), y, ymin: Some(ymin), ymax: Some(ymax) }
}

fn average_multichart<'a>(charts: impl Iterator<Item = &'a MultiChartData>) -> MultiChartData {
    let charts: Vec<&MultiChartData> = charts.collect();
    let series = charts[0].labels.len();
    let len = charts[0].x.len();
    let mut y = vec![vec![0.0; len]; series];
    let mut ymin = vec![vec![f64::INFINITY; len]; series];
    let mut ymax = vec![vec![f64::NEG_INFINITY; len]; series];
    for chart in &charts {
        for s in 0..series {
            for i in 0..len {
                y[s][i] += chart.y[s][i];
                ymin[s][i] = ymin[s][i].min(chart.y[s][i]);
                ymax[s][i] = ymax[s][i].max(chart.y[s][i]);
            }
        }
    }
    let n = charts.len() as f64;
    for series in &mut y {
        for v in series {
            *v /= n;
        }
    }
    MultiChartData {
        x: charts[0].x.clone(),
        y,
        labels: charts[0].labels.clone(),
        ymin: Some(ymin),
        ymax: Some(ymax),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::minimal_config;
    use crate::model::Model;

    fn ts(reception_start: f64, report_end: f64, qc_end: f64) -> StageTimestamps {
        let mut t = StageTimestamps::default();
        t.reception_start = Some(reception_start);
        t.report_end = Some(report_end);
        t.qc_end = Some(qc_end);
        t
    }

    #[test]
    fn mean_of_empty_iterator_is_nan() {
        assert!(mean(std::iter::empty()).is_nan());
    }

    #[test]
    fn overall_and_lab_tat_average_across_specimens() {
        let timestamps = vec![ts(0.0, 10.0, 8.0), ts(0.0, 20.0, 12.0)];
        assert_eq!(overall_tat(&timestamps), 15.0);
        assert_eq!(lab_tat(&timestamps), 10.0);
    }

    #[test]
    fn progress_counts_proportion_under_threshold() {
        // TATs of 1 day and 8 days; progress[7] should be 1/2, progress[10] 2/2.
        let timestamps = vec![ts(0.0, 24.0, 0.0), ts(0.0, 8.0 * 24.0, 0.0)];
        let progress = progress_dist(&timestamps, &PROGRESS_DAYS, |t| t.report_end);
        assert_eq!(progress[&7], 0.5);
        assert_eq!(progress[&10], 1.0);
    }

    #[test]
    fn progress_is_nan_when_no_specimens_completed() {
        let progress = progress_dist(&[], &PROGRESS_DAYS, |t| t.report_end);
        assert!(progress[&7].is_nan());
    }

    #[test]
    fn tat_by_stage_preserves_pipeline_order_and_skips_missing_stages() {
        let mut a = StageTimestamps::default();
        a.reception_start = Some(0.0);
        a.reception_end = Some(1.0);
        a.qc_start = Some(5.0);
        a.qc_end = Some(6.0);
        let chart = tat_by_stage(std::slice::from_ref(&a));
        assert_eq!(chart.x, vec![ChartX::from("reception"), ChartX::from("qc")]);
        assert_eq!(chart.y, vec![1.0, 1.0]);
    }

    #[test]
    fn dedup_last_per_timestamp_keeps_the_final_value_at_each_instant() {
        let samples = [(0.0, 5.0), (1.0, 3.0), (1.0, 4.0), (2.0, 4.0)];
        assert_eq!(dedup_last_per_timestamp(&samples), vec![(0.0, 5.0), (1.0, 4.0), (2.0, 4.0)]);
    }

    #[test]
    fn from_replications_with_one_report_has_no_min_max() {
        let config = minimal_config();
        let model = Model::new(&config, 1).unwrap();
        let report = Report::from_model(&model);
        let combined = Report::from_replications(std::slice::from_ref(&report));
        assert!(combined.overall_tat_min.is_none());
    }

    #[test]
    fn from_replications_averages_scalars_and_sets_min_max() {
        let config = minimal_config();
        let model_a = Model::new(&config, 1).unwrap();
        let model_b = Model::new(&config, 2).unwrap();
        let mut report_a = Report::from_model(&model_a);
        let mut report_b = Report::from_model(&model_b);
        report_a.overall_tat = 10.0;
        report_b.overall_tat = 20.0;
        let combined = Report::from_replications(&[report_a, report_b]);
        assert_eq!(combined.overall_tat, 15.0);
        assert_eq!(combined.overall_tat_min, Some(10.0));
        assert_eq!(combined.overall_tat_max, Some(20.0));
    }

    #[test]
    fn from_model_on_an_empty_run_produces_well_shaped_but_nan_kpis() {
        let config = minimal_config();
        let mut model = Model::new(&config, 7).unwrap();
        model.scheduler.run(model.sim_hours).unwrap();
        let report = Report::from_model(&model);
        assert!(report.overall_tat.is_nan(), "no specimens ever completed in the minimal fixture");
        assert_eq!(report.wip_by_stage.x.len(), 24);
        assert_eq!(report.wip_by_stage.labels.len(), 9);
        assert_eq!(report.utilization_by_resource.x.len(), 15);
        assert_eq!(report.q_length_by_resource.x.len(), 15);
        assert_eq!(report.hourly_utilization_by_resource.x.len(), 24);
        assert_eq!(report.resource_allocation.len(), 15);
    }
}
