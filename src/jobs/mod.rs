//! Job identities and the planning pipeline that produces them.
//!
//! - [`dimensions`]: the value sets of each job dimension
//! - [`codec`]: ordinal job codes and their lookup tables
//! - [`path`]: decomposition of input-file paths into job dimensions
//! - [`enumerate`]: the full job universe for a set of input files
//! - [`partition`]: round-robin distribution of jobs over workers

pub mod codec;
pub mod dimensions;
pub mod enumerate;
pub mod partition;
pub mod path;

use dimensions::{Scenario, ScenarioYear, Vintage};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub use codec::{CodecError, DimensionTables, JobCodec};
pub use enumerate::{enumerate_jobs, valid_scenario_years, EnumerateError};
pub use partition::{partition, JobBatch, PartitionError};
pub use path::{decompose, InputFileDetails, PathFormatError};

/// Identity of one simulation: vintage, climate zone, scenario, year and
/// building archetype.
///
/// Keys are immutable. Validated keys come from [`DimensionTables::key`] or
/// [`JobCodec::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobKey {
    vintage: Vintage,
    climate_zone: String,
    scenario_year: ScenarioYear,
    building_type: String,
}

impl JobKey {
    pub(crate) fn from_parts(
        vintage: Vintage,
        climate_zone: String,
        scenario_year: ScenarioYear,
        building_type: String,
    ) -> Self {
        Self {
            vintage,
            climate_zone,
            scenario_year,
            building_type,
        }
    }

    pub fn vintage(&self) -> Vintage {
        self.vintage
    }

    pub fn climate_zone(&self) -> &str {
        &self.climate_zone
    }

    pub fn scenario_year(&self) -> ScenarioYear {
        self.scenario_year
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario_year.scenario
    }

    pub fn year(&self) -> i32 {
        self.scenario_year.year
    }

    pub fn building_type(&self) -> &str {
        &self.building_type
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.vintage,
            self.climate_zone,
            self.scenario_year.scenario,
            self.scenario_year.year,
            self.building_type
        )
    }
}

/// A job bound to the input file it simulates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationJob {
    pub key: JobKey,
    /// Ordinal code of `key`.
    pub code: String,
    pub input_file: PathBuf,
    /// Directory containing `eplus_simulations/`.
    pub project_root: PathBuf,
    /// Input-file version directory, e.g. `v22_2`.
    pub version: String,
}

impl SimulationJob {
    /// Results directory of this job:
    /// `{root}/eplus_simulations/{vintage}/results/{version}/{cz}/{scenario}_{year}/{building}`.
    ///
    /// Distinct keys map to distinct directories, which is what lets workers
    /// write concurrently without locking.
    pub fn output_dir(&self) -> PathBuf {
        self.project_root
            .join(path::SIMULATIONS_MARKER)
            .join(self.key.vintage().label())
            .join("results")
            .join(&self.version)
            .join(self.key.climate_zone())
            .join(self.key.scenario_year().label())
            .join(self.key.building_type())
    }

    pub fn input_path(&self) -> &Path {
        &self.input_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dir_layout() {
        let job = SimulationJob {
            key: JobKey::from_parts(
                Vintage::Post1980,
                "4a".to_string(),
                ScenarioYear::new(Scenario::Ssp585, 2065),
                "RefBldgHospital".to_string(),
            ),
            code: "1_7_12_1".to_string(),
            input_file: PathBuf::from("/p/eplus_simulations/post1980/idf_files/v22_2/x/a.idf"),
            project_root: PathBuf::from("/p"),
            version: "v22_2".to_string(),
        };
        assert_eq!(
            job.output_dir(),
            PathBuf::from("/p/eplus_simulations/post1980/results/v22_2/4a/ssp585_2065/RefBldgHospital")
        );
        assert_eq!(
            job.key.to_string(),
            "post1980_4a_ssp585_2065_RefBldgHospital"
        );
    }
}
