//! Run configuration.
//!
//! Every field has a default matching the reference project layout, so an
//! empty TOML file (or no file at all) yields a usable configuration.
//!
//! ```toml
//! project_root = "/data/cmip6_and_buildings"
//! years = [2020, 2050, 2080]
//!
//! [completion]
//! expected_artifacts = 4
//! exempt_patterns = ["-meter", "-ssz", "zsz"]
//!
//! [engine]
//! idd_path = "/usr/local/EnergyPlus-22-2-0/Energy+.idd"
//! ```

use crate::completion::CompletionPolicy;
use crate::jobs::codec::{DimensionTables, JobCodec};
use crate::jobs::dimensions::{
    Scenario, ScenarioYear, Vintage, BASELINE_YEAR, BUILDING_TYPES, CLIMATE_ZONES, DEFAULT_YEARS,
};
use crate::jobs::enumerate::valid_scenario_years;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Options passed to the simulation engine for every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable. When unset it is derived from the input file's
    /// version as `{install_prefix}/EnergyPlus-{version}/energyplus`.
    pub executable: Option<PathBuf>,
    pub install_prefix: PathBuf,
    /// Input data dictionary (`Energy+.idd`).
    pub idd_path: PathBuf,
    /// Output file naming style: `L` legacy, `C` capital or `D` dash.
    pub output_suffix: String,
    pub annual: bool,
    pub expand_objects: bool,
    pub readvars: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: None,
            install_prefix: PathBuf::from("/usr/local"),
            idd_path: PathBuf::from("/usr/local/EnergyPlus-22-2-0/Energy+.idd"),
            output_suffix: "D".to_string(),
            annual: true,
            expand_objects: true,
            readvars: true,
        }
    }
}

/// Settings for upgrading input files between engine versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Directory holding the `Transition-*` executables.
    pub updater_dir: PathBuf,
    pub source_version: String,
    pub target_version: String,
    /// Input directory name of the source version under `idf_files/`.
    pub source_dir_name: String,
    /// Input directory name of the target version under `idf_files/`.
    pub target_dir_name: String,
    /// Version tag in source file names, replaced by `target_version`.
    pub source_tag: String,
    /// Executable suffix, e.g. `.exe` on Windows.
    pub executable_suffix: String,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            updater_dir: PathBuf::from("/usr/local/EnergyPlus-22-2-0/PreProcess/IDFVersionUpdater"),
            source_version: "V7-2-0".to_string(),
            target_version: "V22-2-0".to_string(),
            source_dir_name: "v7_2".to_string(),
            target_dir_name: "v22_2".to_string(),
            source_tag: "v1.4_7.2".to_string(),
            executable_suffix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub project_root: PathBuf,
    /// Input-file version directory under `idf_files/`.
    pub input_version: String,
    pub input_extension: String,
    pub vintages: Vec<Vintage>,
    pub scenarios: Vec<Scenario>,
    pub years: Vec<i32>,
    pub baseline_year: i32,
    pub climate_zones: Vec<String>,
    pub building_types: Vec<String>,
    /// Percentile of the morphed weather ensemble.
    pub weather_percentile: u32,
    /// Half width of the climatology window around each target year.
    pub year_band_half_width: i32,
    pub completion: CompletionPolicy,
    pub engine: EngineConfig,
    pub transition: TransitionConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            input_version: "v22_2".to_string(),
            input_extension: "idf".to_string(),
            vintages: Vintage::ALL.to_vec(),
            scenarios: Scenario::ALL.to_vec(),
            years: DEFAULT_YEARS.to_vec(),
            baseline_year: BASELINE_YEAR,
            climate_zones: CLIMATE_ZONES.iter().map(|s| s.to_string()).collect(),
            building_types: BUILDING_TYPES.iter().map(|s| s.to_string()).collect(),
            weather_percentile: 50,
            year_band_half_width: 15,
            completion: CompletionPolicy::default(),
            engine: EngineConfig::default(),
            transition: TransitionConfig::default(),
        }
    }
}

impl RunConfig {
    /// Loads and validates a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RunConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty_unique("vintages", &self.vintages)?;
        non_empty_unique("scenarios", &self.scenarios)?;
        non_empty_unique("years", &self.years)?;
        non_empty_unique("climate_zones", &self.climate_zones)?;
        non_empty_unique("building_types", &self.building_types)?;

        if !self.years.contains(&self.baseline_year) {
            return Err(ConfigError::Invalid(format!(
                "baseline_year {} is not listed in years",
                self.baseline_year
            )));
        }
        if self.completion.expected_artifacts == 0 {
            return Err(ConfigError::Invalid(
                "completion.expected_artifacts must be positive".to_string(),
            ));
        }
        if self.year_band_half_width < 0 {
            return Err(ConfigError::Invalid(
                "year_band_half_width must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scenario_years(&self) -> Vec<ScenarioYear> {
        valid_scenario_years(&self.scenarios, &self.years, self.baseline_year)
    }

    pub fn dimension_tables(&self) -> DimensionTables {
        DimensionTables::new(
            self.vintages.iter().copied(),
            self.climate_zones.iter().cloned(),
            self.scenario_years(),
            self.building_types.iter().cloned(),
        )
    }

    pub fn codec(&self) -> JobCodec {
        JobCodec::new(self.dimension_tables())
    }
}

fn non_empty_unique<T: Eq + Hash + std::fmt::Debug>(
    name: &str,
    values: &[T],
) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
    }
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(ConfigError::Invalid(format!(
                "{} lists {:?} more than once",
                name, value
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scenario_years().len(), 13);
        assert_eq!(config.codec().tables().building_types.len(), 16);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            project_root = "/data/proj"
            vintages = ["new"]
            years = [2020, 2050]

            [completion]
            expected_artifacts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.project_root, PathBuf::from("/data/proj"));
        assert_eq!(config.vintages, vec![Vintage::New]);
        assert_eq!(config.completion.expected_artifacts, 5);
        assert_eq!(config.completion.exempt_patterns.len(), 3);
        assert_eq!(config.engine.output_suffix, "D");
        assert_eq!(config.scenario_years().len(), 4);
    }

    #[test]
    fn test_baseline_must_be_listed() {
        let config = RunConfig {
            years: vec![2035, 2050],
            ..RunConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicates_rejected() {
        let config = RunConfig {
            climate_zones: vec!["1a".to_string(), "1a".to_string()],
            ..RunConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("climate_zones"));
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            RunConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "vintages = [\"mid1990\"]").unwrap();
        assert!(matches!(
            RunConfig::from_file(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }
}
