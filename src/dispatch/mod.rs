//! Turning jobs into engine invocations and running them.
//!
//! The engine itself is an external executable behind the
//! [`SimulationEngine`] trait. A failed invocation is reported as
//! [`JobExecutionFailed`] and never retried here.

pub mod idf;
pub mod worker;

use crate::config::EngineConfig;
use crate::jobs::SimulationJob;
use crate::weather::{WeatherError, WeatherResolver};
use idf::IdfError;
use serde::Serialize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Idf(#[from] IdfError),

    #[error("failed to prepare output directory '{}': {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{}' exited with {status}: {stderr}", program.display())]
    NonZeroExit {
        program: PathBuf,
        status: String,
        stderr: String,
    },
}

/// A job that could not be executed, with the reason.
#[derive(Debug, Error)]
#[error("job {code} ({label}) failed: {cause}")]
pub struct JobExecutionFailed {
    pub code: String,
    pub label: String,
    #[source]
    pub cause: DispatchError,
}

/// Everything the engine needs for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationPayload {
    pub executable: PathBuf,
    pub input_file: PathBuf,
    pub weather_file: PathBuf,
    pub output_dir: PathBuf,
    pub idd_path: PathBuf,
    /// Dashed engine version the input targets, e.g. `22-2-0`.
    pub ep_version: String,
    pub output_prefix: String,
    pub output_suffix: String,
    pub annual: bool,
    pub expand_objects: bool,
    pub readvars: bool,
}

impl InvocationPayload {
    /// Command-line arguments for the EnergyPlus CLI.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-w".into(),
            self.weather_file.clone().into(),
            "-d".into(),
            self.output_dir.clone().into(),
            "-p".into(),
            self.output_prefix.clone().into(),
            "-s".into(),
            self.output_suffix.clone().into(),
            "-i".into(),
            self.idd_path.clone().into(),
        ];
        if self.annual {
            args.push("-a".into());
        }
        if self.expand_objects {
            args.push("-x".into());
        }
        if self.readvars {
            args.push("-r".into());
        }
        args.push(self.input_file.clone().into());
        args
    }
}

/// Captured result of an external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub success: bool,
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutcome {
    /// Runs `command` to completion, capturing its output.
    pub fn capture(program: &Path, command: &mut Command) -> Result<Self, DispatchError> {
        let output = command.output().map_err(|source| DispatchError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;
        Ok(Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Converts an unsuccessful outcome into an error.
    pub fn into_result(self, program: &Path) -> Result<Self, DispatchError> {
        if self.success {
            return Ok(self);
        }
        let status = match self.code {
            Some(code) => format!("exit code {}", code),
            None => "a signal".to_string(),
        };
        Err(DispatchError::NonZeroExit {
            program: program.to_path_buf(),
            status,
            stderr: tail(&self.stderr, 20),
        })
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// The external simulation engine.
pub trait SimulationEngine: Sync {
    fn simulate(&self, payload: &InvocationPayload) -> Result<ProcessOutcome, DispatchError>;
}

/// Runs the EnergyPlus command-line executable.
#[derive(Debug, Clone, Default)]
pub struct EnergyPlusCli;

impl SimulationEngine for EnergyPlusCli {
    fn simulate(&self, payload: &InvocationPayload) -> Result<ProcessOutcome, DispatchError> {
        let mut command = Command::new(&payload.executable);
        command.args(payload.args());
        ProcessOutcome::capture(&payload.executable, &mut command)?.into_result(&payload.executable)
    }
}

/// Builds invocations from jobs and prepares their output directories.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    engine: EngineConfig,
    weather_percentile: u32,
    year_band_half_width: i32,
}

impl Dispatcher {
    pub fn new(engine: EngineConfig, weather_percentile: u32, year_band_half_width: i32) -> Self {
        Self {
            engine,
            weather_percentile,
            year_band_half_width,
        }
    }

    pub fn from_config(config: &crate::config::RunConfig) -> Self {
        Self::new(
            config.engine.clone(),
            config.weather_percentile,
            config.year_band_half_width,
        )
    }

    /// Resolves the weather file, engine version and output location of a job.
    ///
    /// Reads the input file but does not touch the output directory.
    pub fn build_invocation(&self, job: &SimulationJob) -> Result<InvocationPayload, DispatchError> {
        let resolver = WeatherResolver::new(
            &job.project_root,
            self.weather_percentile,
            self.year_band_half_width,
        );
        let weather_file = resolver.resolve(job.key.climate_zone(), job.key.scenario_year())?;
        let ep_version = idf::read_ep_version(&job.input_file)?;

        let executable = match &self.engine.executable {
            Some(exe) => exe.clone(),
            None => self
                .engine
                .install_prefix
                .join(format!("EnergyPlus-{}", ep_version))
                .join("energyplus"),
        };
        let output_prefix = job
            .input_file
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .unwrap_or("eplus")
            .to_string();

        Ok(InvocationPayload {
            executable,
            input_file: job.input_file.clone(),
            weather_file,
            output_dir: job.output_dir(),
            idd_path: self.engine.idd_path.clone(),
            ep_version,
            output_prefix,
            output_suffix: self.engine.output_suffix.clone(),
            annual: self.engine.annual,
            expand_objects: self.engine.expand_objects,
            readvars: self.engine.readvars,
        })
    }

    /// Builds the invocation, clears the output directory and runs the engine.
    pub fn dispatch<E: SimulationEngine + ?Sized>(
        &self,
        job: &SimulationJob,
        engine: &E,
    ) -> Result<ProcessOutcome, JobExecutionFailed> {
        let failed = |cause: DispatchError| JobExecutionFailed {
            code: job.code.clone(),
            label: job.key.to_string(),
            cause,
        };

        let payload = self.build_invocation(job).map_err(failed)?;
        prepare_output_dir(&payload.output_dir).map_err(failed)?;
        engine.simulate(&payload).map_err(failed)
    }
}

/// Creates `dir` if needed and removes anything already inside it.
///
/// Not atomic with the run that follows: a crash in between leaves an empty
/// directory, which the completion check classifies as incomplete.
pub fn prepare_output_dir(dir: &Path) -> Result<(), DispatchError> {
    let err = |source: io::Error| DispatchError::OutputDir {
        path: dir.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(err)?;
    for entry in std::fs::read_dir(dir).map_err(err)? {
        let path = entry.map_err(err)?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path).map_err(err)?;
        } else {
            std::fs::remove_file(&path).map_err(err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::jobs::dimensions::{Scenario, ScenarioYear, Vintage};
    use std::fs;

    fn job_in(root: &Path, scenario_year: ScenarioYear) -> SimulationJob {
        let config = RunConfig::default();
        let key = config
            .dimension_tables()
            .key(Vintage::New, "4a", scenario_year, "RefBldgWarehouse")
            .unwrap();
        let input = root
            .join("eplus_simulations/new/idf_files/v22_2/4a_new_v22_2/RefBldgWarehouse_New2004_4A.idf");
        fs::create_dir_all(input.parent().unwrap()).unwrap();
        fs::write(&input, "Version,22.2;").unwrap();
        SimulationJob {
            code: config.codec().encode(&key).unwrap(),
            key,
            input_file: input,
            project_root: root.to_path_buf(),
            version: "v22_2".to_string(),
        }
    }

    #[test]
    fn test_build_invocation_historical() {
        let dir = tempfile::tempdir().unwrap();
        let tmy3 = dir.path().join("weather_files/tmy3");
        fs::create_dir_all(&tmy3).unwrap();
        fs::write(tmy3.join("4a_USA_MD_Baltimore.epw"), "").unwrap();

        let job = job_in(dir.path(), ScenarioYear::new(Scenario::Historical, 2020));
        let dispatcher = Dispatcher::from_config(&RunConfig::default());
        let payload = dispatcher.build_invocation(&job).unwrap();

        assert_eq!(payload.weather_file, tmy3.join("4a_USA_MD_Baltimore.epw"));
        assert_eq!(payload.ep_version, "22-2-0");
        assert_eq!(payload.output_prefix, "RefBldgWarehouse_New2004_4A");
        assert_eq!(
            payload.executable,
            PathBuf::from("/usr/local/EnergyPlus-22-2-0/energyplus")
        );
        assert!(payload
            .output_dir
            .ends_with("eplus_simulations/new/results/v22_2/4a/historical_2020/RefBldgWarehouse"));
        // Building the payload has no side effects on the output tree.
        assert!(!payload.output_dir.exists());

        let args: Vec<String> = payload
            .args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-w");
        assert!(args.contains(&"-a".to_string()));
        assert!(args.contains(&"-x".to_string()));
        assert!(args.contains(&"-r".to_string()));
        assert_eq!(
            args.last().unwrap(),
            &job.input_file.to_string_lossy().into_owned()
        );
    }

    #[test]
    fn test_build_invocation_missing_weather() {
        let dir = tempfile::tempdir().unwrap();
        let job = job_in(dir.path(), ScenarioYear::new(Scenario::Ssp126, 2050));
        let dispatcher = Dispatcher::from_config(&RunConfig::default());
        assert!(matches!(
            dispatcher.build_invocation(&job),
            Err(DispatchError::Weather(WeatherError::NotFound(_)))
        ));
    }

    #[test]
    fn test_prepare_output_dir_is_idempotent_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a/b/c");
        prepare_output_dir(&out).unwrap();
        prepare_output_dir(&out).unwrap();

        fs::write(out.join("stale.csv"), "x").unwrap();
        fs::create_dir_all(out.join("nested")).unwrap();
        prepare_output_dir(&out).unwrap();
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_outcome_becomes_error() {
        let outcome = ProcessOutcome {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: "line1\nFatal error\n".to_string(),
        };
        let err = outcome.into_result(Path::new("energyplus")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("Fatal error"));
    }
}
