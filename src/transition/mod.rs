//! Upgrading input files through the chain of version-transition tools.
//!
//! Each tool converts a file in place from one engine version to the next.
//! A file is copied to a per-zone temp directory, stepped through the chain
//! and then copied to its destination under the target version directory.
//! Conversion tasks are partitioned round-robin over workers, like
//! simulation jobs.

use crate::config::TransitionConfig;
use crate::dispatch::worker::JobStatus;
use crate::dispatch::{DispatchError, ProcessOutcome};
use crate::jobs::dimensions::Vintage;
use crate::jobs::path::SIMULATIONS_MARKER;
use crate::jobs::{partition, PartitionError};
use crossbeam::queue::SegQueue;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Engine versions with a transition tool from each to the next, oldest first.
pub const VERSION_CHAIN: [&str; 20] = [
    "V7-2-0", "V8-0-0", "V8-1-0", "V8-2-0", "V8-3-0", "V8-4-0", "V8-5-0", "V8-6-0", "V8-7-0",
    "V8-8-0", "V8-9-0", "V9-0-0", "V9-1-0", "V9-2-0", "V9-3-0", "V9-4-0", "V9-5-0", "V9-6-0",
    "V22-1-0", "V22-2-0",
];

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("unknown engine version '{0}'")]
    UnknownVersion(String),

    #[error("cannot transition backwards from {from} to {to}")]
    Backwards { from: String, to: String },

    #[error("{action} '{}' failed: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{step} failed on '{}': {source}", file.display())]
    Step {
        step: TransitionStep,
        file: PathBuf,
        #[source]
        source: DispatchError,
    },

    #[error("failed to scan source directory: {0}")]
    Scan(#[from] walkdir::Error),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Normalizes a version string to the `V{major}-{minor}-{patch}` form.
///
/// ```
/// use epbatch::transition::format_version;
/// assert_eq!(format_version("22.2"), "V22-2-0");
/// assert_eq!(format_version("V8-1-0"), "V8-1-0");
/// ```
pub fn format_version(version: &str) -> String {
    let mut parts: Vec<&str> = version
        .trim()
        .trim_start_matches(|c: char| c == 'V' || c == 'v')
        .split(|c: char| c.is_ascii_punctuation())
        .filter(|p| !p.is_empty())
        .collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    format!("V{}", parts.join("-"))
}

/// Version a transition executable produces, taken from its file name.
///
/// `Transition-V8-0-0-to-V8-1-0.exe` yields `V8-1-0`.
pub fn target_of(program: &str) -> &str {
    let name = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    let stem = name.split('.').next().unwrap_or(name);
    stem.rsplit("-to-").next().unwrap_or(stem)
}

/// One link of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionStep {
    pub from: &'static str,
    pub to: &'static str,
}

impl TransitionStep {
    /// Executable name of this step, e.g. `Transition-V7-2-0-to-V8-0-0`.
    pub fn program(&self, suffix: &str) -> String {
        format!("Transition-{}-to-{}{}", self.from, self.to, suffix)
    }
}

impl fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

fn chain_index(version: &str) -> Result<usize, TransitionError> {
    let formatted = format_version(version);
    VERSION_CHAIN
        .iter()
        .position(|v| *v == formatted)
        .ok_or_else(|| TransitionError::UnknownVersion(version.to_string()))
}

/// The ordered steps that take a file from `source` to `target`.
///
/// Empty when both are the same version.
pub fn steps(source: &str, target: &str) -> Result<Vec<TransitionStep>, TransitionError> {
    let from = chain_index(source)?;
    let to = chain_index(target)?;
    if to < from {
        return Err(TransitionError::Backwards {
            from: format_version(source),
            to: format_version(target),
        });
    }
    Ok(VERSION_CHAIN[from..=to]
        .windows(2)
        .map(|pair| TransitionStep {
            from: pair[0],
            to: pair[1],
        })
        .collect())
}

/// Applies a single transition step to a file, in place.
pub trait TransitionTool: Sync {
    fn apply(&self, step: &TransitionStep, file: &Path) -> Result<(), DispatchError>;
}

/// Runs the `Transition-*` executables from the version updater directory.
#[derive(Debug, Clone)]
pub struct UpdaterCli {
    pub updater_dir: PathBuf,
    pub executable_suffix: String,
}

impl UpdaterCli {
    pub fn from_config(config: &TransitionConfig) -> Self {
        Self {
            updater_dir: config.updater_dir.clone(),
            executable_suffix: config.executable_suffix.clone(),
        }
    }
}

impl TransitionTool for UpdaterCli {
    fn apply(&self, step: &TransitionStep, file: &Path) -> Result<(), DispatchError> {
        let program = self
            .updater_dir
            .join(step.program(&self.executable_suffix));
        // The tools locate their IDD files relative to the working directory.
        let mut command = Command::new(&program);
        command.arg(file).current_dir(&self.updater_dir);
        ProcessOutcome::capture(&program, &mut command)?.into_result(&program)?;
        Ok(())
    }
}

/// One file to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionTask {
    pub vintage: Vintage,
    pub climate_zone: String,
    pub source: PathBuf,
    pub temp_file: PathBuf,
    pub destination: PathBuf,
}

impl ConversionTask {
    pub fn file_name(&self) -> String {
        self.destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn io_err(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> TransitionError {
    let path = path.to_path_buf();
    move |source| TransitionError::Io {
        action,
        path,
        source,
    }
}

/// Lists the files still to convert for each vintage and climate zone.
///
/// Sources are the input files in `*{cz}_*` group directories under
/// `idf_files/{source_dir_name}`. A file is skipped when its destination
/// already exists or a temp copy is still present from an interrupted run.
pub fn plan_conversions(
    project_root: &Path,
    config: &TransitionConfig,
    vintages: &[Vintage],
    climate_zones: &[String],
) -> Result<Vec<ConversionTask>, TransitionError> {
    let target_version = format_version(&config.target_version);
    let mut tasks = Vec::new();

    for &vintage in vintages {
        let idf_root = project_root
            .join(SIMULATIONS_MARKER)
            .join(vintage.label())
            .join("idf_files");
        let source_root = idf_root.join(&config.source_dir_name);
        if !source_root.is_dir() {
            debug!(vintage = %vintage, dir = %source_root.display(), "no source directory");
            continue;
        }

        for cz in climate_zones {
            let group_pattern = format!("{}_", cz);
            let temp_dir = source_root.join(format!("temp_{}", cz));
            let dest_dir = idf_root.join(&config.target_dir_name).join(format!(
                "{}_{}_{}",
                cz,
                vintage.label(),
                config.target_dir_name
            ));

            let mut sources = Vec::new();
            for entry in WalkDir::new(&source_root).min_depth(2).max_depth(2) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let group = path
                    .parent()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                    .unwrap_or("");
                let is_idf = path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case("idf"))
                    .unwrap_or(false);
                if is_idf && group.contains(&group_pattern) && !group.starts_with("temp_") {
                    sources.push(path.to_path_buf());
                }
            }
            sources.sort();

            for source in sources {
                let name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().replace(&config.source_tag, &target_version))
                    .unwrap_or_default();
                let temp_file = temp_dir.join(&name);
                let destination = dest_dir.join(&name);
                if destination.exists() || temp_file.exists() {
                    debug!(file = %name, "already converted or in flight");
                    continue;
                }
                tasks.push(ConversionTask {
                    vintage,
                    climate_zone: cz.clone(),
                    source,
                    temp_file,
                    destination,
                });
            }
        }
    }

    Ok(tasks)
}

/// Converts one file: copy to temp, run every step, copy to destination,
/// clean up the temp copy.
pub fn convert<T: TransitionTool + ?Sized>(
    task: &ConversionTask,
    chain: &[TransitionStep],
    tool: &T,
) -> Result<(), TransitionError> {
    let temp_dir = task.temp_file.parent().unwrap_or(Path::new("."));
    let dest_dir = task.destination.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(temp_dir).map_err(io_err("creating", temp_dir))?;
    fs::create_dir_all(dest_dir).map_err(io_err("creating", dest_dir))?;

    fs::copy(&task.source, &task.temp_file).map_err(io_err("copying", &task.source))?;
    for step in chain {
        debug!(step = %step, file = %task.temp_file.display(), "transition step");
        tool.apply(step, &task.temp_file)
            .map_err(|source| TransitionError::Step {
                step: *step,
                file: task.temp_file.clone(),
                source,
            })?;
    }
    fs::copy(&task.temp_file, &task.destination).map_err(io_err("copying", &task.temp_file))?;

    fs::remove_file(&task.temp_file).map_err(io_err("removing", &task.temp_file))?;
    // Other workers may still be using the zone's temp directory.
    let _ = fs::remove_dir(temp_dir);
    Ok(())
}

/// Outcome of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRecord {
    pub worker: usize,
    pub position: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(flatten)]
    pub status: JobStatus,
    pub seconds: f64,
}

impl ConversionRecord {
    pub fn failed(&self) -> bool {
        matches!(self.status, JobStatus::Failed { .. })
    }
}

/// Converts every task, partitioned round-robin over `workers` threads.
///
/// A failed file is logged and recorded; the worker moves on to its next
/// file. With `dry_run` nothing is touched and every task is recorded as
/// planned.
pub fn run_conversions<T: TransitionTool + ?Sized>(
    tasks: &[ConversionTask],
    workers: usize,
    chain: &[TransitionStep],
    tool: &T,
    dry_run: bool,
) -> Result<Vec<ConversionRecord>, TransitionError> {
    let batch = partition(tasks, workers)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(batch.worker_count())
        .thread_name(|i| format!("epbatch-transition-{}", i))
        .build()?;
    let sink = SegQueue::new();

    info!(files = tasks.len(), workers, steps = chain.len(), dry_run, "starting conversions");

    pool.install(|| {
        batch
            .partitions()
            .par_iter()
            .enumerate()
            .for_each(|(worker, part)| {
                for (position, task) in part.iter().enumerate() {
                    let started = Instant::now();
                    let status = if dry_run {
                        JobStatus::Planned
                    } else {
                        match convert(task, chain, tool) {
                            Ok(()) => {
                                info!(worker, file = %task.file_name(), "converted");
                                JobStatus::Succeeded
                            }
                            Err(e) => {
                                warn!(worker, file = %task.source.display(), error = %e, "conversion failed; continuing");
                                JobStatus::Failed {
                                    cause: e.to_string(),
                                }
                            }
                        }
                    };
                    sink.push(ConversionRecord {
                        worker,
                        position,
                        source: task.source.clone(),
                        destination: task.destination.clone(),
                        status,
                        seconds: started.elapsed().as_secs_f64(),
                    });
                }
            });
    });

    let mut records = Vec::with_capacity(sink.len());
    while let Some(record) = sink.pop() {
        records.push(record);
    }
    records.sort_by_key(|r| (r.worker, r.position));
    Ok(records)
}
