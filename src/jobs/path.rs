//! Input-file path decomposition.
//!
//! Input files live at
//! `{project_root}/eplus_simulations/{vintage}/idf_files/{version}/{cz}_{vintage}_{version}/{file}`
//! and their file names are underscore-delimited with the building type first
//! and the climate zone third, e.g. `RefBldgLargeOffice_New_4A_v22_2.idf`.
//! Any deviation is an error; nothing is guessed. The building field is
//! returned verbatim and matched against the archetype table during
//! enumeration.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directory name separating the project root from the simulation tree.
pub const SIMULATIONS_MARKER: &str = "eplus_simulations";

/// Dimension values recovered from an input-file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFileDetails {
    pub project_root: PathBuf,
    pub vintage: String,
    pub version: String,
    pub building_type: String,
    /// Lower-cased climate zone code.
    pub climate_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathFormatError {
    #[error("path '{0}' has no 'eplus_simulations' segment")]
    MissingMarker(PathBuf),

    #[error("path '{path}' is missing the {segment} segment")]
    MissingSegment { path: PathBuf, segment: &'static str },

    #[error("file name of '{path}' has {found} '_'-separated fields, expected at least 3")]
    FileNameFields { path: PathBuf, found: usize },

    #[error("path '{0}' is not valid UTF-8")]
    NonUtf8(PathBuf),
}

/// Splits an input-file path into its project root and job dimensions.
///
/// # Example
///
/// ```
/// use epbatch::jobs::decompose;
///
/// let details = decompose(
///     "/data/eplus_simulations/post1980/idf_files/v22_2/4a_post1980_v22_2/RefBldgLargeOffice_New_4A_v22_2.idf",
/// )?;
/// assert_eq!(details.vintage, "post1980");
/// assert_eq!(details.climate_zone, "4a");
/// assert_eq!(details.building_type, "RefBldgLargeOffice");
/// # Ok::<(), epbatch::jobs::PathFormatError>(())
/// ```
pub fn decompose<P: AsRef<Path>>(path: P) -> Result<InputFileDetails, PathFormatError> {
    let path = path.as_ref();
    let components: Vec<Component> = path.components().collect();

    let marker = components
        .iter()
        .position(|c| c.as_os_str() == SIMULATIONS_MARKER)
        .ok_or_else(|| PathFormatError::MissingMarker(path.to_path_buf()))?;

    let project_root: PathBuf = components[..marker].iter().collect();
    let tail: Vec<&str> = components[marker + 1..]
        .iter()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| PathFormatError::NonUtf8(path.to_path_buf()))
        })
        .collect::<Result<_, _>>()?;

    // vintage / idf_files / version / group dir / file
    let segment = |idx: usize, segment: &'static str| {
        tail.get(idx)
            .copied()
            .ok_or_else(|| PathFormatError::MissingSegment {
                path: path.to_path_buf(),
                segment,
            })
    };
    let vintage = segment(0, "vintage")?;
    let version = segment(2, "version")?;
    if tail.len() < 4 {
        return Err(PathFormatError::MissingSegment {
            path: path.to_path_buf(),
            segment: "file name",
        });
    }
    let file_name = tail[tail.len() - 1];
    let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);

    let fields: Vec<&str> = stem.split('_').collect();
    if fields.len() < 3 {
        return Err(PathFormatError::FileNameFields {
            path: path.to_path_buf(),
            found: fields.len(),
        });
    }

    Ok(InputFileDetails {
        project_root,
        vintage: vintage.to_string(),
        version: version.to_string(),
        building_type: fields[0].to_string(),
        climate_zone: fields[2].to_lowercase(),
    })
}
