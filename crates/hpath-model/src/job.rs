//! The `submit`/`status`/`results` boundary spec.md §6 names "if embedded in
//! a server". The REST/queue façade itself is out of scope (§1); this module
//! only defines the trait a server would implement and an in-memory
//! reference implementation for tests and single-process callers, grounded
//! on `original_source/hpath/restful/redis.py`'s job-record shape.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::Config;
use crate::kpis::Report;

/// Opaque handle returned by [`JobStore::submit`]; callers pass it back to
/// [`JobStore::status`]/[`JobStore::results`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(pub u64);

/// A job's lifecycle state. A job never goes backwards: `Queued` ->
/// `Running` -> `Completed`/`Failed`.
#[derive(Debug, Clone)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed(String),
}

struct JobRecord {
    analysis_id: Option<i64>,
    status: JobStatus,
    result: Option<Report>,
}

/// Submits config/seed pairs for simulation and retrieves their results once
/// a runner has executed them. This crate does not run jobs itself; callers
/// (a CLI, a worker pool, a test) drive a [`JobStore`] by submitting, running
/// the model out-of-band, and recording the outcome.
pub trait JobStore {
    /// Register a new job for `config` under `seed`, grouped with any other
    /// job sharing `analysis_id` (spec.md §6: multi-scenario comparison
    /// groups runs by `analysis_id`). Returns immediately with `Queued`.
    fn submit(&self, config: Config, seed: u64, analysis_id: Option<i64>) -> JobHandle;

    /// The job's current lifecycle state, or `None` if `handle` is unknown.
    fn status(&self, handle: JobHandle) -> Option<JobStatus>;

    /// The job's `Report`, if it has reached `Completed`. Returns `None` for
    /// jobs that are still running, failed, or unknown.
    fn results(&self, handle: JobHandle) -> Option<Report>;

    /// Every job sharing `analysis_id` that has completed, combined into one
    /// [`Report`] via [`Report::from_replications`]. `None` if no job in the
    /// group has completed yet.
    fn aggregate(&self, analysis_id: i64) -> Option<Report>;

    /// Record that `handle` has started executing.
    fn mark_running(&self, handle: JobHandle);

    /// Record a job's outcome, ending its lifecycle.
    fn complete(&self, handle: JobHandle, report: Report);

    /// Record that a job's run failed with `message`, ending its lifecycle.
    fn fail(&self, handle: JobHandle, message: String);
}

/// A single-process [`JobStore`] backed by a `Mutex<HashMap>`. No queue, no
/// network binding: a real server would implement [`JobStore`] over
/// Redis/Postgres the way `original_source/hpath/restful/redis.py` does, and
/// swap in a worker pool for the out-of-band execution this type assumes.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<u64, JobRecord>>,
    next_id: Mutex<u64>,
    /// Retained only so a future runner can re-read the config a job was
    /// submitted with; not read by any method here.
    configs: Mutex<HashMap<u64, (Config, u64)>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn submit(&self, config: Config, seed: u64, analysis_id: Option<i64>) -> JobHandle {
        let mut next_id = self.next_id.lock();
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        self.jobs.lock().insert(
            id,
            JobRecord {
                analysis_id,
                status: JobStatus::Queued,
                result: None,
            },
        );
        self.configs.lock().insert(id, (config, seed));
        JobHandle(id)
    }

    fn status(&self, handle: JobHandle) -> Option<JobStatus> {
        self.jobs.lock().get(&handle.0).map(|j| j.status.clone())
    }

    fn results(&self, handle: JobHandle) -> Option<Report> {
        self.jobs.lock().get(&handle.0).and_then(|j| j.result.clone())
    }

    fn aggregate(&self, analysis_id: i64) -> Option<Report> {
        let jobs = self.jobs.lock();
        let reports: Vec<Report> = jobs
            .values()
            .filter(|j| j.analysis_id == Some(analysis_id))
            .filter_map(|j| j.result.clone())
            .collect();
        if reports.is_empty() {
            None
        } else {
            Some(Report::from_replications(&reports))
        }
    }

    fn mark_running(&self, handle: JobHandle) {
        if let Some(job) = self.jobs.lock().get_mut(&handle.0) {
            job.status = JobStatus::Running;
        }
    }

    fn complete(&self, handle: JobHandle, report: Report) {
        if let Some(job) = self.jobs.lock().get_mut(&handle.0) {
            job.status = JobStatus::Completed;
            job.result = Some(report);
        }
    }

    fn fail(&self, handle: JobHandle, message: String) {
        if let Some(job) = self.jobs.lock().get_mut(&handle.0) {
            job.status = JobStatus::Failed(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::minimal_config;
    use crate::model::Model;

    #[test]
    fn unknown_handle_reports_no_status() {
        let store = InMemoryJobStore::new();
        assert!(store.status(JobHandle(42)).is_none());
        assert!(store.results(JobHandle(42)).is_none());
    }

    #[test]
    fn submitted_job_starts_queued_then_transitions_to_completed() {
        let store = InMemoryJobStore::new();
        let config = minimal_config();
        let handle = store.submit(config.clone(), 1, None);
        assert!(matches!(store.status(handle), Some(JobStatus::Queued)));

        store.mark_running(handle);
        assert!(matches!(store.status(handle), Some(JobStatus::Running)));

        let model = Model::new(&config, 1).unwrap();
        let report = model.run().unwrap();
        store.complete(handle, report);
        assert!(matches!(store.status(handle), Some(JobStatus::Completed)));
        assert!(store.results(handle).is_some());
    }

    #[test]
    fn failed_job_carries_its_message() {
        let store = InMemoryJobStore::new();
        let handle = store.submit(minimal_config(), 1, None);
        store.fail(handle, "config validation failed".to_string());
        match store.status(handle) {
            Some(JobStatus::Failed(msg)) => assert_eq!(msg, "config validation failed"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn aggregate_combines_completed_jobs_sharing_an_analysis_id() {
        let store = InMemoryJobStore::new();
        let config = minimal_config();
        let h1 = store.submit(config.clone(), 1, Some(7));
        let h2 = store.submit(config.clone(), 2, Some(7));
        let h3 = store.submit(config.clone(), 3, Some(9));

        assert!(store.aggregate(7).is_none());

        let r1 = Model::new(&config, 1).unwrap().run().unwrap();
        let r2 = Model::new(&config, 2).unwrap().run().unwrap();
        let r3 = Model::new(&config, 3).unwrap().run().unwrap();
        store.complete(h1, r1);
        store.complete(h2, r2);
        store.complete(h3, r3);

        assert!(store.aggregate(7).is_some());
        assert!(store.aggregate(9).is_some());
        assert!(store.aggregate(11).is_none());
    }
}
