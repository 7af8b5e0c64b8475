//! Construction of the job universe.

use crate::jobs::codec::{CodecError, Dimension, JobCodec};
use crate::jobs::dimensions::{Scenario, ScenarioYear, Vintage};
use crate::jobs::path::{decompose, PathFormatError, SIMULATIONS_MARKER};
use crate::jobs::SimulationJob;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error(transparent)]
    Path(#[from] PathFormatError),

    #[error("{source} (in '{}')", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("failed to scan input directory: {0}")]
    Scan(#[from] walkdir::Error),
}

/// Valid (scenario, year) pairs in scenario-major, year-minor order.
///
/// The historical pathway keeps only `baseline_year`; every other pathway
/// keeps every year except `baseline_year`.
pub fn valid_scenario_years(
    scenarios: &[Scenario],
    years: &[i32],
    baseline_year: i32,
) -> Vec<ScenarioYear> {
    scenarios
        .iter()
        .flat_map(|&scenario| {
            years
                .iter()
                .filter(move |&&year| scenario.is_historical() == (year == baseline_year))
                .map(move |&year| ScenarioYear::new(scenario, year))
        })
        .collect()
}

/// Crosses scenario years with input files into the ordered job list.
///
/// Order is scenario-year major, input-file minor, following the order of the
/// arguments. Files whose vintage is not in `vintages` are ignored.
///
/// # Errors
///
/// Fails on the first input path that does not decompose, or whose
/// dimension labels are not in the codec tables.
pub fn enumerate_jobs(
    codec: &JobCodec,
    vintages: &[Vintage],
    input_files: &[PathBuf],
    scenario_years: &[ScenarioYear],
) -> Result<Vec<SimulationJob>, EnumerateError> {
    struct Source<'a> {
        path: &'a Path,
        vintage: Vintage,
        details: crate::jobs::path::InputFileDetails,
    }

    let mut sources = Vec::with_capacity(input_files.len());
    for path in input_files {
        let mut details = decompose(path)?;
        let vintage = details
            .vintage
            .parse::<Vintage>()
            .map_err(|_| EnumerateError::Codec {
                path: path.clone(),
                source: CodecError::UnknownLabel {
                    dimension: Dimension::Vintage,
                    label: details.vintage.clone(),
                },
            })?;
        if vintages.contains(&vintage) {
            details.building_type = codec
                .tables()
                .resolve_building_type(&details.building_type)
                .map_err(|source| EnumerateError::Codec {
                    path: path.clone(),
                    source,
                })?
                .to_string();
            sources.push(Source {
                path,
                vintage,
                details,
            });
        }
    }

    let mut jobs = Vec::with_capacity(sources.len() * scenario_years.len());
    for &scenario_year in scenario_years {
        for source in &sources {
            let codec_err = |source_err: CodecError| EnumerateError::Codec {
                path: source.path.to_path_buf(),
                source: source_err,
            };
            let key = codec
                .tables()
                .key(
                    source.vintage,
                    &source.details.climate_zone,
                    scenario_year,
                    &source.details.building_type,
                )
                .map_err(codec_err)?;
            let code = codec.encode(&key).map_err(codec_err)?;
            jobs.push(SimulationJob {
                key,
                code,
                input_file: source.path.to_path_buf(),
                project_root: source.details.project_root.clone(),
                version: source.details.version.clone(),
            });
        }
    }

    Ok(jobs)
}

/// Lists input files under
/// `{root}/eplus_simulations/{vintage}/idf_files/{version}/*{version}/*.{extension}`.
///
/// Vintages are scanned in the given order and files sorted by path within
/// each vintage, so the result is stable across runs. A missing vintage
/// directory contributes no files.
pub fn discover_input_files(
    project_root: &Path,
    vintages: &[Vintage],
    version: &str,
    extension: &str,
) -> Result<Vec<PathBuf>, EnumerateError> {
    let mut files = Vec::new();
    for vintage in vintages {
        let version_dir = project_root
            .join(SIMULATIONS_MARKER)
            .join(vintage.label())
            .join("idf_files")
            .join(version);
        if !version_dir.is_dir() {
            tracing::debug!(dir = %version_dir.display(), "no input directory for vintage");
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&version_dir).min_depth(2).max_depth(2) {
            let entry = entry?;
            let path = entry.path();
            let in_group = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(version));
            let has_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == extension);
            if entry.file_type().is_file() && in_group && has_ext {
                found.push(path.to_path_buf());
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}
