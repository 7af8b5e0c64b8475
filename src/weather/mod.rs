//! Weather file resolution.
//!
//! Present-day runs use the TMY3 file of the job's climate zone:
//! `{root}/weather_files/tmy3/{cz}<sep>*.epw`. Future runs use a morphed file
//! named from the scenario, ensemble percentile and the climatology window
//! around the target year:
//! `{root}/weather_files/morphed/{cz}/{scenario}/EPWs/{scenario}_{ptile}_{start}-{end}.epw`.

pub mod epw;

use crate::jobs::dimensions::{year_band, ScenarioYear};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("no TMY3 weather file for climate zone '{climate_zone}' in '{}'", dir.display())]
    NoBaselineFile { climate_zone: String, dir: PathBuf },

    #[error("weather file '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read weather data from '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed weather file '{}': {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
}

/// Maps (climate zone, scenario year) to a weather file under a project root.
#[derive(Debug, Clone)]
pub struct WeatherResolver {
    root: PathBuf,
    percentile: u32,
    half_width: i32,
}

impl WeatherResolver {
    pub fn new<P: Into<PathBuf>>(project_root: P, percentile: u32, half_width: i32) -> Self {
        Self {
            root: project_root.into(),
            percentile,
            half_width,
        }
    }

    pub fn tmy3_dir(&self) -> PathBuf {
        self.root.join("weather_files").join("tmy3")
    }

    /// Morphed file path for a future scenario. Existence is not checked.
    pub fn morphed_path(&self, climate_zone: &str, scenario_year: ScenarioYear) -> PathBuf {
        let scenario = scenario_year.scenario.label();
        self.root
            .join("weather_files")
            .join("morphed")
            .join(climate_zone)
            .join(scenario)
            .join("EPWs")
            .join(format!(
                "{}_{}_{}.epw",
                scenario,
                self.percentile,
                year_band(scenario_year.year, self.half_width)
            ))
    }

    /// First TMY3 file (by name) for the climate zone.
    ///
    /// A file matches when its name starts with the zone code followed by a
    /// non-alphanumeric character, so `3b` does not pick up `3bc` files.
    pub fn baseline_path(&self, climate_zone: &str) -> Result<PathBuf, WeatherError> {
        let dir = self.tmy3_dir();
        let no_file = || WeatherError::NoBaselineFile {
            climate_zone: climate_zone.to_string(),
            dir: dir.clone(),
        };

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(no_file()),
            Err(source) => {
                return Err(WeatherError::Io {
                    path: dir.clone(),
                    source,
                })
            }
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| WeatherError::Io {
                path: dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_zone_file(&name, climate_zone) {
                candidates.push(entry.path());
            }
        }
        candidates.sort();
        candidates.into_iter().next().ok_or_else(no_file)
    }

    /// Resolves and checks the weather file for a job.
    pub fn resolve(
        &self,
        climate_zone: &str,
        scenario_year: ScenarioYear,
    ) -> Result<PathBuf, WeatherError> {
        if scenario_year.scenario.is_historical() {
            return self.baseline_path(climate_zone);
        }
        let path = self.morphed_path(climate_zone, scenario_year);
        if !path.is_file() {
            return Err(WeatherError::NotFound(path));
        }
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_zone_file(name: &str, climate_zone: &str) -> bool {
    let lower = name.to_lowercase();
    if !lower.ends_with(".epw") {
        return false;
    }
    match lower.strip_prefix(climate_zone) {
        Some(rest) => rest.chars().next().is_some_and(|c| !c.is_ascii_alphanumeric()),
        None => false,
    }
}
