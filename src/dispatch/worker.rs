//! Workers that execute partitions.
//!
//! Each worker walks its partition strictly in order. A failing job is
//! logged, recorded and skipped over; the rest of the partition still runs.
//! Workers share nothing but the outcome queue.

use crate::dispatch::{Dispatcher, SimulationEngine};
use crate::jobs::{JobBatch, SimulationJob};
use crossbeam::queue::SegQueue;
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed { cause: String },
    /// Dry run: the invocation was built but not executed.
    Planned,
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub worker: usize,
    /// Position of the job within its partition.
    pub position: usize,
    pub code: String,
    pub label: String,
    #[serde(flatten)]
    pub status: JobStatus,
    pub seconds: f64,
}

impl JobRecord {
    pub fn failed(&self) -> bool {
        matches!(self.status, JobStatus::Failed { .. })
    }
}

/// Runs one partition sequentially, pushing a record per job into `sink`.
pub fn run_partition<E: SimulationEngine + ?Sized>(
    worker: usize,
    jobs: &[SimulationJob],
    dispatcher: &Dispatcher,
    engine: &E,
    dry_run: bool,
    sink: &SegQueue<JobRecord>,
) {
    info!(worker, jobs = jobs.len(), "worker started");

    for (position, job) in jobs.iter().enumerate() {
        let started = Instant::now();
        let status = if dry_run {
            match dispatcher.build_invocation(job) {
                Ok(payload) => {
                    debug!(worker, code = %job.code, weather = %payload.weather_file.display(), "planned");
                    JobStatus::Planned
                }
                Err(cause) => {
                    warn!(worker, code = %job.code, error = %cause, "cannot build invocation");
                    JobStatus::Failed {
                        cause: cause.to_string(),
                    }
                }
            }
        } else {
            debug!(worker, code = %job.code, label = %job.key, "dispatching");
            match dispatcher.dispatch(job, engine) {
                Ok(_) => JobStatus::Succeeded,
                Err(failure) => {
                    warn!(worker, code = %failure.code, error = %failure.cause, "job failed; continuing");
                    JobStatus::Failed {
                        cause: failure.cause.to_string(),
                    }
                }
            }
        };

        sink.push(JobRecord {
            worker,
            position,
            code: job.code.clone(),
            label: job.key.to_string(),
            status,
            seconds: started.elapsed().as_secs_f64(),
        });
    }

    info!(worker, "worker finished");
}

/// Runs every partition of `batch` on its own thread and gathers the records,
/// ordered by worker and position.
pub fn run_batch<E: SimulationEngine + ?Sized>(
    batch: &JobBatch<SimulationJob>,
    dispatcher: &Dispatcher,
    engine: &E,
    dry_run: bool,
) -> Result<Vec<JobRecord>, rayon::ThreadPoolBuildError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(batch.worker_count())
        .thread_name(|i| format!("epbatch-worker-{}", i))
        .build()?;
    let sink = SegQueue::new();

    pool.install(|| {
        batch
            .partitions()
            .par_iter()
            .enumerate()
            .for_each(|(worker, jobs)| run_partition(worker, jobs, dispatcher, engine, dry_run, &sink));
    });

    Ok(drain_sorted(sink))
}

/// Runs a single partition on the calling thread.
pub fn run_single<E: SimulationEngine + ?Sized>(
    worker: usize,
    jobs: &[SimulationJob],
    dispatcher: &Dispatcher,
    engine: &E,
    dry_run: bool,
) -> Vec<JobRecord> {
    let sink = SegQueue::new();
    run_partition(worker, jobs, dispatcher, engine, dry_run, &sink);
    drain_sorted(sink)
}

fn drain_sorted(sink: SegQueue<JobRecord>) -> Vec<JobRecord> {
    let mut records = Vec::with_capacity(sink.len());
    while let Some(record) = sink.pop() {
        records.push(record);
    }
    records.sort_by_key(|r| (r.worker, r.position));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::dispatch::{DispatchError, InvocationPayload, ProcessOutcome};
    use crate::jobs::dimensions::{Scenario, ScenarioYear, Vintage};
    use crate::jobs::partition;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    /// Fails for one building type, records every payload it sees.
    struct FakeEngine {
        fail_for: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl SimulationEngine for FakeEngine {
        fn simulate(&self, payload: &InvocationPayload) -> Result<ProcessOutcome, DispatchError> {
            self.seen
                .lock()
                .unwrap()
                .push(payload.output_prefix.clone());
            let outcome = ProcessOutcome {
                success: !payload.output_prefix.starts_with(self.fail_for),
                code: Some(if payload.output_prefix.starts_with(self.fail_for) { 1 } else { 0 }),
                stdout: String::new(),
                stderr: "** Fatal **".to_string(),
            };
            outcome.into_result(Path::new("fake"))
        }
    }

    fn jobs(root: &Path) -> Vec<SimulationJob> {
        let config = RunConfig::default();
        let tables = config.dimension_tables();
        let tmy3 = root.join("weather_files/tmy3");
        fs::create_dir_all(&tmy3).unwrap();
        fs::write(tmy3.join("2a_USA_TX_Houston.epw"), "").unwrap();

        ["RefBldgWarehouse", "RefBldgHospital", "RefBldgSmallOffice"]
            .iter()
            .map(|b| {
                let input = root.join(format!(
                    "eplus_simulations/pre1980/idf_files/v22_2/2a_pre1980_v22_2/{}_Pre1980_2A.idf",
                    b
                ));
                fs::create_dir_all(input.parent().unwrap()).unwrap();
                fs::write(&input, "Version,22.2;").unwrap();
                let key = tables
                    .key(
                        Vintage::Pre1980,
                        "2a",
                        ScenarioYear::new(Scenario::Historical, 2020),
                        b,
                    )
                    .unwrap();
                SimulationJob {
                    code: config.codec().encode(&key).unwrap(),
                    key,
                    input_file: input,
                    project_root: root.to_path_buf(),
                    version: "v22_2".to_string(),
                }
            })
            .collect()
    }

    #[test]
    fn test_failure_does_not_stop_partition() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path());
        let engine = FakeEngine {
            fail_for: "RefBldgWarehouse",
            seen: Mutex::new(Vec::new()),
        };
        let dispatcher = Dispatcher::from_config(&RunConfig::default());

        let records = run_single(0, &jobs, &dispatcher, &engine, false);
        assert_eq!(records.len(), 3);
        assert!(records[0].failed());
        assert_eq!(records[1].status, JobStatus::Succeeded);
        assert_eq!(records[2].status, JobStatus::Succeeded);
        assert_eq!(engine.seen.lock().unwrap().len(), 3);

        // Output directories exist (and were cleared) for every dispatched job.
        for job in &jobs {
            assert!(job.output_dir().is_dir());
        }
    }

    #[test]
    fn test_run_batch_covers_every_job() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path());
        let engine = FakeEngine {
            fail_for: "none",
            seen: Mutex::new(Vec::new()),
        };
        let dispatcher = Dispatcher::from_config(&RunConfig::default());
        let batch = partition(&jobs, 2).unwrap();

        let records = run_batch(&batch, &dispatcher, &engine, false).unwrap();
        let workers: Vec<(usize, usize)> = records.iter().map(|r| (r.worker, r.position)).collect();
        assert_eq!(workers, vec![(0, 0), (0, 1), (1, 0)]);
        assert!(records.iter().all(|r| r.status == JobStatus::Succeeded));
        assert_eq!(records[1].code, jobs[2].code);
    }

    #[test]
    fn test_record_carries_fractional_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path());
        let engine = FakeEngine {
            fail_for: "none",
            seen: Mutex::new(Vec::new()),
        };
        let dispatcher = Dispatcher::from_config(&RunConfig::default());

        let records = run_single(0, &jobs[..1], &dispatcher, &engine, true);
        let mut slower = records[0].clone();
        assert_eq!(slower, records[0]);
        slower.seconds += 0.5;
        assert_ne!(slower, records[0]);

        let json = serde_json::to_value(&slower).unwrap();
        assert!(json["seconds"].is_f64());
        assert_eq!(json["status"], "planned");
    }

    #[test]
    fn test_dry_run_executes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path());
        let engine = FakeEngine {
            fail_for: "none",
            seen: Mutex::new(Vec::new()),
        };
        let dispatcher = Dispatcher::from_config(&RunConfig::default());

        let records = run_single(3, &jobs, &dispatcher, &engine, true);
        assert!(records.iter().all(|r| r.status == JobStatus::Planned && r.worker == 3));
        assert!(engine.seen.lock().unwrap().is_empty());
        assert!(!jobs[0].output_dir().exists());
    }
}
