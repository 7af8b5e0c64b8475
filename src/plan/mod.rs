//! One orchestration pass: enumerate, check completion, partition.
//!
//! A plan reflects the filesystem at the moment it is built, and completion
//! changes as soon as workers start. Independent worker processes must
//! therefore share one saved [`PlanFile`] instead of each planning anew.

use crate::completion::{CompletionOracle, CompletionVerdict};
use crate::config::RunConfig;
use crate::jobs::enumerate::{discover_input_files, enumerate_jobs, EnumerateError};
use crate::jobs::{
    decompose, partition, CodecError, JobBatch, JobCodec, PartitionError, PathFormatError,
    SimulationJob,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Enumerate(#[from] EnumerateError),

    #[error("failed to read output directory '{}': {source}", path.display())]
    Assess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("failed to access plan file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed plan file '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("planned job {code}: {source}")]
    Codec {
        code: String,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    InputPath(#[from] PathFormatError),

    #[error("planned job {code} does not match its input file '{}'", input_file.display())]
    Mismatch { code: String, input_file: PathBuf },

    #[error("worker index {index} out of range for a plan with {workers} workers")]
    WorkerIndex { index: usize, workers: usize },
}

/// A job together with its completion verdict.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub job: SimulationJob,
    pub verdict: CompletionVerdict,
    pub forced: bool,
}

/// Result of planning: every assessed job and the batch still to run.
#[derive(Debug, Clone)]
pub struct Plan {
    pub assessments: Vec<Assessment>,
    pub batch: JobBatch<SimulationJob>,
    pub essentials_only: bool,
}

impl Plan {
    pub fn total_jobs(&self) -> usize {
        self.assessments.len()
    }

    pub fn pending_jobs(&self) -> usize {
        self.batch.job_count()
    }
}

/// A planned job as stored in a [`PlanFile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedJob {
    pub code: String,
    pub input_file: PathBuf,
}

/// Frozen partitions of a plan.
///
/// Written once by `epbatch plan --save-plan`; every worker process reads its
/// partition from the same file, so the assignment cannot drift while jobs
/// complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFile {
    pub essentials_only: bool,
    pub partitions: Vec<Vec<PlannedJob>>,
}

impl PlanFile {
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            essentials_only: plan.essentials_only,
            partitions: plan
                .batch
                .partitions()
                .iter()
                .map(|part| {
                    part.iter()
                        .map(|job| PlannedJob {
                            code: job.code.clone(),
                            input_file: job.input_file.clone(),
                        })
                        .collect()
                })
                .collect(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PlanError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| PlanError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PlanError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rebuilds the jobs of partition `index`, validating every code
    /// against `codec` and against its input path.
    pub fn partition(&self, codec: &JobCodec, index: usize) -> Result<Vec<SimulationJob>, PlanError> {
        let part = self
            .partitions
            .get(index)
            .ok_or(PlanError::WorkerIndex {
                index,
                workers: self.worker_count(),
            })?;
        part.iter().map(|planned| restore(codec, planned)).collect()
    }

    /// Rebuilds every partition.
    pub fn batch(&self, codec: &JobCodec) -> Result<JobBatch<SimulationJob>, PlanError> {
        let partitions = (0..self.worker_count())
            .map(|index| self.partition(codec, index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JobBatch::from_partitions(partitions))
    }
}

fn restore(codec: &JobCodec, planned: &PlannedJob) -> Result<SimulationJob, PlanError> {
    let codec_err = |source: CodecError| PlanError::Codec {
        code: planned.code.clone(),
        source,
    };
    let key = codec.decode(&planned.code).map_err(codec_err)?;
    let details = decompose(&planned.input_file)?;
    let building = codec
        .tables()
        .resolve_building_type(&details.building_type)
        .map_err(codec_err)?;

    if key.vintage().label() != details.vintage
        || key.climate_zone() != details.climate_zone
        || key.building_type() != building
    {
        return Err(PlanError::Mismatch {
            code: planned.code.clone(),
            input_file: planned.input_file.clone(),
        });
    }

    Ok(SimulationJob {
        key,
        code: planned.code.clone(),
        input_file: planned.input_file.clone(),
        project_root: details.project_root,
        version: details.version,
    })
}

/// Plans a run over the input files found under the configured project root.
pub fn build_plan(config: &RunConfig, workers: usize, essentials_only: bool) -> Result<Plan, PlanError> {
    let files = discover_input_files(
        &config.project_root,
        &config.vintages,
        &config.input_version,
        &config.input_extension,
    )?;
    info!(
        files = files.len(),
        root = %config.project_root.display(),
        "discovered input files"
    );
    plan_for_files(config, &files, workers, essentials_only)
}

/// Plans a run over an explicit list of input files.
pub fn plan_for_files(
    config: &RunConfig,
    input_files: &[PathBuf],
    workers: usize,
    essentials_only: bool,
) -> Result<Plan, PlanError> {
    if workers == 0 {
        return Err(PartitionError::InvalidPartitionCount(workers).into());
    }

    let codec = config.codec();
    let jobs = enumerate_jobs(
        &codec,
        &config.vintages,
        input_files,
        &config.scenario_years(),
    )?;

    let oracle = CompletionOracle::new(config.completion.clone(), essentials_only);
    // Order-preserving parallel collect; the output order matches `jobs`.
    let assessments: Vec<Assessment> = jobs
        .into_par_iter()
        .map(|job| {
            let verdict = oracle.assess(&job).map_err(|source| PlanError::Assess {
                path: job.output_dir(),
                source,
            })?;
            let forced = oracle.is_forced(&job.input_file);
            Ok(Assessment {
                job,
                verdict,
                forced,
            })
        })
        .collect::<Result<_, PlanError>>()?;

    let pending: Vec<SimulationJob> = assessments
        .iter()
        .filter(|a| a.verdict.needs_run())
        .map(|a| a.job.clone())
        .collect();
    let batch = partition(&pending, workers)?;

    info!(
        total = assessments.len(),
        pending = pending.len(),
        workers,
        essentials_only,
        "plan ready"
    );

    Ok(Plan {
        assessments,
        batch,
        essentials_only,
    })
}
