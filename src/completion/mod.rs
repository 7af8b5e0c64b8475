//! Decides whether a job's results are already on disk.
//!
//! The decision is a pure function of the job's input path and the names of
//! the files found in its output directory. The policy values (expected
//! artifact count, exempt name fragments, archetypes that always rerun) are
//! tied to the engine's output naming and are therefore configuration.

use crate::jobs::SimulationJob;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;

/// Policy table for completion checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionPolicy {
    /// Number of files a finished run leaves in its output directory.
    pub expected_artifacts: usize,
    /// Name fragments of auxiliary outputs that do not count towards completion.
    pub exempt_patterns: Vec<String>,
    /// Archetypes (matched against the input path) whose outputs are never
    /// trusted and which therefore always rerun.
    pub forced_buildings: Vec<String>,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            expected_artifacts: 4,
            exempt_patterns: vec!["-meter".to_string(), "-ssz".to_string(), "zsz".to_string()],
            forced_buildings: vec![
                "RefBldgMidriseApartment".to_string(),
                "RefBldgMediumOffice".to_string(),
            ],
        }
    }
}

/// Outcome of a completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionVerdict {
    /// Results are present; the job is skipped.
    Complete,
    /// Results are missing or untrusted; the job runs.
    Incomplete,
    /// The output directory holds more non-exempt files than a finished run
    /// produces. The state cannot be classified, so the job runs.
    UnknownRunAnyway,
}

impl CompletionVerdict {
    pub fn needs_run(&self) -> bool {
        !matches!(self, CompletionVerdict::Complete)
    }
}

impl fmt::Display for CompletionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionVerdict::Complete => write!(f, "complete"),
            CompletionVerdict::Incomplete => write!(f, "incomplete"),
            CompletionVerdict::UnknownRunAnyway => write!(f, "unknown"),
        }
    }
}

/// Applies a [`CompletionPolicy`] to jobs.
#[derive(Debug, Clone)]
pub struct CompletionOracle {
    policy: CompletionPolicy,
    essentials_only: bool,
}

impl CompletionOracle {
    /// With `essentials_only` set, only the forced archetypes are ever
    /// scheduled; every other job is treated as complete.
    pub fn new(policy: CompletionPolicy, essentials_only: bool) -> Self {
        Self {
            policy,
            essentials_only,
        }
    }

    pub fn policy(&self) -> &CompletionPolicy {
        &self.policy
    }

    pub fn essentials_only(&self) -> bool {
        self.essentials_only
    }

    /// Returns true if the input file belongs to an always-rerun archetype.
    pub fn is_forced(&self, input_file: &Path) -> bool {
        let path = input_file.to_string_lossy();
        self.policy
            .forced_buildings
            .iter()
            .any(|b| path.contains(b.as_str()))
    }

    /// Classifies a job from the artifact names found in its output directory.
    pub fn check<S: AsRef<str>>(&self, job: &SimulationJob, artifacts: &[S]) -> CompletionVerdict {
        self.check_input(&job.input_file, artifacts)
    }

    /// Same as [`check`](Self::check) but keyed on the input path alone.
    pub fn check_input<S: AsRef<str>>(&self, input_file: &Path, artifacts: &[S]) -> CompletionVerdict {
        if self.is_forced(input_file) {
            return CompletionVerdict::Incomplete;
        }

        let verdict = self.classify(artifacts);
        if self.essentials_only && verdict.needs_run() {
            CompletionVerdict::Complete
        } else {
            verdict
        }
    }

    fn classify<S: AsRef<str>>(&self, artifacts: &[S]) -> CompletionVerdict {
        let expected = self.policy.expected_artifacts;
        if artifacts.len() == expected {
            return CompletionVerdict::Complete;
        }
        // An empty directory is what an interrupted run leaves behind.
        if artifacts.is_empty() {
            return CompletionVerdict::Incomplete;
        }

        let remaining = artifacts
            .iter()
            .filter(|name| {
                let name = name.as_ref();
                !self
                    .policy
                    .exempt_patterns
                    .iter()
                    .any(|p| name.contains(p.as_str()))
            })
            .count();

        if remaining == 0 {
            CompletionVerdict::Complete
        } else if remaining > expected {
            CompletionVerdict::UnknownRunAnyway
        } else {
            CompletionVerdict::Incomplete
        }
    }

    /// Reads the job's output directory and classifies it.
    ///
    /// The directory is read on every call; nothing is cached.
    pub fn assess(&self, job: &SimulationJob) -> io::Result<CompletionVerdict> {
        let artifacts = read_artifacts(&job.output_dir())?;
        Ok(self.check(job, &artifacts))
    }
}

/// File names present in `dir`, sorted. A missing directory has no artifacts.
pub fn read_artifacts(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn oracle(essentials_only: bool) -> CompletionOracle {
        CompletionOracle::new(CompletionPolicy::default(), essentials_only)
    }

    fn input(building: &str) -> PathBuf {
        PathBuf::from(format!(
            "/p/eplus_simulations/new/idf_files/v22_2/4a_new_v22_2/{}_New2004_4A.idf",
            building
        ))
    }

    #[test]
    fn test_expected_count_is_complete() {
        let artifacts = ["eplusout.csv", "eplusout.err", "eplustbl.htm", "eplusout.sql"];
        assert_eq!(
            oracle(false).check_input(&input("RefBldgWarehouse"), &artifacts),
            CompletionVerdict::Complete
        );
    }

    #[test]
    fn test_missing_artifacts_are_incomplete() {
        let artifacts = ["a.csv", "b.csv"];
        assert_eq!(
            oracle(false).check_input(&input("RefBldgWarehouse"), &artifacts),
            CompletionVerdict::Incomplete
        );

        let artifacts = ["a-meter.csv", "b.csv"];
        assert_eq!(
            oracle(false).check_input(&input("RefBldgWarehouse"), &artifacts),
            CompletionVerdict::Incomplete
        );
    }

    #[test]
    fn test_only_exempt_artifacts_is_complete() {
        let artifacts = ["out-meter.csv", "out-ssz.csv", "outzsz.csv"];
        assert_eq!(
            oracle(false).check_input(&input("RefBldgWarehouse"), &artifacts),
            CompletionVerdict::Complete
        );
    }

    #[test]
    fn test_empty_directory_is_incomplete() {
        let artifacts: [&str; 0] = [];
        assert_eq!(
            oracle(false).check_input(&input("RefBldgWarehouse"), &artifacts),
            CompletionVerdict::Incomplete
        );
    }

    #[test]
    fn test_surplus_artifacts_are_unknown() {
        let artifacts = ["a.csv", "b.csv", "c.csv", "d.csv", "e.csv", "f-meter.csv"];
        let verdict = oracle(false).check_input(&input("RefBldgWarehouse"), &artifacts);
        assert_eq!(verdict, CompletionVerdict::UnknownRunAnyway);
        assert!(verdict.needs_run());
    }

    #[test]
    fn test_essentials_only_skips_regular_buildings() {
        let artifacts = ["a.csv"];
        assert!(oracle(false)
            .check_input(&input("RefBldgWarehouse"), &artifacts)
            .needs_run());
        assert_eq!(
            oracle(true).check_input(&input("RefBldgWarehouse"), &artifacts),
            CompletionVerdict::Complete
        );
    }

    #[test]
    fn test_forced_buildings_always_run() {
        let complete = ["a", "b", "c", "d"];
        for building in ["RefBldgMidriseApartment", "RefBldgMediumOffice"] {
            for essentials in [false, true] {
                assert_eq!(
                    oracle(essentials).check_input(&input(building), &complete),
                    CompletionVerdict::Incomplete
                );
            }
        }
    }

    #[test]
    fn test_read_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_artifacts(&dir.path().join("absent")).unwrap().is_empty());

        std::fs::write(dir.path().join("b.csv"), "").unwrap();
        std::fs::write(dir.path().join("a.csv"), "").unwrap();
        assert_eq!(read_artifacts(dir.path()).unwrap(), vec!["a.csv", "b.csv"]);
    }
}
