//! Compact ordinal codes for job identities.
//!
//! A job code is four ordinals joined by `_`, one per dimension:
//! `{vintage}_{climate_zone}_{scenario_year}_{building_type}`. Scenario and
//! year share a single ordinal because the valid pairs are a filtered subset
//! of their cross product. Ordinals are positions in the [`DimensionTables`]
//! the codec was built from, so codes are only meaningful for a fixed table
//! configuration.

use crate::jobs::dimensions::{ScenarioYear, Vintage};
use crate::jobs::JobKey;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Separator between the ordinals of a job code.
pub const CODE_DELIMITER: char = '_';

const CODE_SEGMENTS: usize = 4;

/// The four encoded dimensions, in code order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Vintage,
    ClimateZone,
    ScenarioYear,
    BuildingType,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Vintage => "vintage",
            Dimension::ClimateZone => "climate zone",
            Dimension::ScenarioYear => "scenario year",
            Dimension::BuildingType => "building type",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised when encoding or decoding job codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown {dimension} label '{label}'")]
    UnknownLabel { dimension: Dimension, label: String },

    #[error("malformed job code '{code}': {reason}")]
    MalformedCode { code: String, reason: String },

    #[error("{dimension} ordinal {ordinal} has no label")]
    OrdinalOutOfRange { dimension: Dimension, ordinal: usize },
}

/// Bidirectional label/ordinal table for one dimension.
#[derive(Debug, Clone)]
pub struct LabelTable<T> {
    labels: Vec<T>,
    index: HashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> LabelTable<T> {
    /// Builds the table; the first occurrence of a repeated label wins.
    pub fn new(labels: impl IntoIterator<Item = T>) -> Self {
        let mut table = Self {
            labels: Vec::new(),
            index: HashMap::new(),
        };
        for label in labels {
            if !table.index.contains_key(&label) {
                table.index.insert(label.clone(), table.labels.len());
                table.labels.push(label);
            }
        }
        table
    }

    pub fn ordinal(&self, label: &T) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn label(&self, ordinal: usize) -> Option<&T> {
        self.labels.get(ordinal)
    }

    pub fn contains(&self, label: &T) -> bool {
        self.index.contains_key(label)
    }

    pub fn labels(&self) -> &[T] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Lookup tables for all four job dimensions.
///
/// Built once from configuration and shared by reference; nothing here is
/// global.
#[derive(Debug, Clone)]
pub struct DimensionTables {
    pub vintages: LabelTable<Vintage>,
    pub climate_zones: LabelTable<String>,
    pub scenario_years: LabelTable<ScenarioYear>,
    pub building_types: LabelTable<String>,
}

impl DimensionTables {
    pub fn new<S: Into<String>>(
        vintages: impl IntoIterator<Item = Vintage>,
        climate_zones: impl IntoIterator<Item = S>,
        scenario_years: impl IntoIterator<Item = ScenarioYear>,
        building_types: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            vintages: LabelTable::new(vintages),
            climate_zones: LabelTable::new(climate_zones.into_iter().map(Into::into)),
            scenario_years: LabelTable::new(scenario_years),
            building_types: LabelTable::new(building_types.into_iter().map(Into::into)),
        }
    }

    /// Builds a validated [`JobKey`], rejecting labels outside the tables.
    pub fn key(
        &self,
        vintage: Vintage,
        climate_zone: &str,
        scenario_year: ScenarioYear,
        building_type: &str,
    ) -> Result<JobKey, CodecError> {
        if !self.vintages.contains(&vintage) {
            return Err(unknown(Dimension::Vintage, vintage));
        }
        if !self.climate_zones.contains(&climate_zone.to_string()) {
            return Err(unknown(Dimension::ClimateZone, climate_zone));
        }
        if !self.scenario_years.contains(&scenario_year) {
            return Err(unknown(Dimension::ScenarioYear, scenario_year));
        }
        if !self.building_types.contains(&building_type.to_string()) {
            return Err(unknown(Dimension::BuildingType, building_type));
        }
        Ok(JobKey::from_parts(
            vintage,
            climate_zone.to_string(),
            scenario_year,
            building_type.to_string(),
        ))
    }

    /// Maps the leading file-name field of an input file to its archetype.
    ///
    /// Files straight from the reference set carry the bare archetype
    /// (`RefBldgHospital`); upgraded ones may append the vintage
    /// (`RefBldgHospitalPre1980`). An exact label wins, otherwise the longest
    /// label the field starts with. No match is an error.
    pub fn resolve_building_type(&self, field: &str) -> Result<&str, CodecError> {
        let labels = self.building_types.labels();
        if let Some(exact) = labels.iter().find(|l| l.as_str() == field) {
            return Ok(exact.as_str());
        }
        labels
            .iter()
            .filter(|l| field.starts_with(l.as_str()))
            .max_by_key(|l| l.len())
            .map(String::as_str)
            .ok_or_else(|| unknown(Dimension::BuildingType, field))
    }
}

fn unknown(dimension: Dimension, label: impl fmt::Display) -> CodecError {
    CodecError::UnknownLabel {
        dimension,
        label: label.to_string(),
    }
}

/// Encodes and decodes job codes against a fixed set of tables.
#[derive(Debug, Clone)]
pub struct JobCodec {
    tables: DimensionTables,
}

impl JobCodec {
    pub fn new(tables: DimensionTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &DimensionTables {
        &self.tables
    }

    /// Encodes a job identity as its ordinal code.
    ///
    /// # Errors
    ///
    /// [`CodecError::UnknownLabel`] if any dimension label is not in the tables.
    pub fn encode(&self, key: &JobKey) -> Result<String, CodecError> {
        let t = &self.tables;
        let vintage = t
            .vintages
            .ordinal(&key.vintage())
            .ok_or_else(|| unknown(Dimension::Vintage, key.vintage()))?;
        let climate_zone = t
            .climate_zones
            .ordinal(&key.climate_zone().to_string())
            .ok_or_else(|| unknown(Dimension::ClimateZone, key.climate_zone()))?;
        let scenario_year = t
            .scenario_years
            .ordinal(&key.scenario_year())
            .ok_or_else(|| unknown(Dimension::ScenarioYear, key.scenario_year()))?;
        let building_type = t
            .building_types
            .ordinal(&key.building_type().to_string())
            .ok_or_else(|| unknown(Dimension::BuildingType, key.building_type()))?;

        Ok(format!(
            "{vintage}{d}{climate_zone}{d}{scenario_year}{d}{building_type}",
            d = CODE_DELIMITER
        ))
    }

    /// Decodes an ordinal code back to a job identity.
    ///
    /// # Errors
    ///
    /// - [`CodecError::MalformedCode`] if the code does not have exactly four
    ///   numeric segments
    /// - [`CodecError::OrdinalOutOfRange`] if an ordinal has no label
    pub fn decode(&self, code: &str) -> Result<JobKey, CodecError> {
        let segments: Vec<&str> = code.split(CODE_DELIMITER).collect();
        if segments.len() != CODE_SEGMENTS {
            return Err(CodecError::MalformedCode {
                code: code.to_string(),
                reason: format!(
                    "expected {} segments, found {}",
                    CODE_SEGMENTS,
                    segments.len()
                ),
            });
        }

        let mut ordinals = [0usize; CODE_SEGMENTS];
        for (slot, segment) in ordinals.iter_mut().zip(&segments) {
            let malformed = || CodecError::MalformedCode {
                code: code.to_string(),
                reason: format!("segment '{}' is not an ordinal", segment),
            };
            // Canonical form only: plain digits, no sign, no leading zero.
            let canonical = !segment.is_empty()
                && segment.bytes().all(|b| b.is_ascii_digit())
                && (*segment == "0" || !segment.starts_with('0'));
            if !canonical {
                return Err(malformed());
            }
            *slot = segment.parse::<usize>().map_err(|_| malformed())?;
        }

        let t = &self.tables;
        let vintage = *lookup(&t.vintages, Dimension::Vintage, ordinals[0])?;
        let climate_zone = lookup(&t.climate_zones, Dimension::ClimateZone, ordinals[1])?;
        let scenario_year = *lookup(&t.scenario_years, Dimension::ScenarioYear, ordinals[2])?;
        let building_type = lookup(&t.building_types, Dimension::BuildingType, ordinals[3])?;

        Ok(JobKey::from_parts(
            vintage,
            climate_zone.clone(),
            scenario_year,
            building_type.clone(),
        ))
    }

    /// Decodes a code into its readable form,
    /// `{vintage}_{climate_zone}_{scenario}_{year}_{building_type}`.
    pub fn expand(&self, code: &str) -> Result<String, CodecError> {
        self.decode(code).map(|key| key.to_string())
    }
}

fn lookup<T: Clone + Eq + Hash>(
    table: &LabelTable<T>,
    dimension: Dimension,
    ordinal: usize,
) -> Result<&T, CodecError> {
    table
        .label(ordinal)
        .ok_or(CodecError::OrdinalOutOfRange { dimension, ordinal })
}
