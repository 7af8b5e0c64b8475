//! EPW (EnergyPlus Weather) header parsing.
//!
//! Only the first header line is read. It has the format:
//! `LOCATION,City,StateProv,Country,DataSource,WMO,Latitude,Longitude,TimeZone,Elevation`
//!
//! The simulation locations of each climate zone come from the TMY3 file
//! headers; the hourly records are consumed by the engine, not by this crate.

use crate::weather::WeatherError;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const LOCATION_TAG: &str = "LOCATION";

/// Site described by an EPW `LOCATION` header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpwLocation {
    pub city: String,
    pub state: String,
    pub country: String,
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

impl EpwLocation {
    /// `(longitude, latitude)`, the order map layers expect.
    pub fn lon_lat(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// Reads the `LOCATION` header of an EPW file.
pub fn read_location<P: AsRef<Path>>(path: P) -> Result<EpwLocation, WeatherError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| WeatherError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|source| WeatherError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    parse_location(&first).map_err(|reason| WeatherError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parses a `LOCATION` header line.
pub fn parse_location(line: &str) -> Result<EpwLocation, String> {
    let parts: Vec<&str> = line.trim().split(',').map(str::trim).collect();

    if parts.first().copied() != Some(LOCATION_TAG) {
        return Err("first line is not a LOCATION header".to_string());
    }
    if parts.len() < 8 {
        return Err(format!(
            "LOCATION header has {} fields, expected at least 8",
            parts.len()
        ));
    }

    let coordinate = |idx: usize, name: &str| {
        parts[idx]
            .parse::<f64>()
            .map_err(|_| format!("invalid {} '{}'", name, parts[idx]))
    };

    Ok(EpwLocation {
        city: parts[1].to_string(),
        state: parts[2].to_string(),
        country: parts[3].to_string(),
        latitude: coordinate(6, "latitude")?,
        longitude: coordinate(7, "longitude")?,
    })
}
