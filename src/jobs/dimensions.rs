//! Dimension values of the simulation matrix.
//!
//! A simulation job is one point in the product of building vintage, climate
//! zone, climate scenario, target year and reference building archetype. The
//! default value lists here mirror the project layout on disk; callers can
//! override them through [`crate::config::RunConfig`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Building-code era bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Vintage {
    /// Buildings constructed before 1980.
    #[serde(rename = "pre1980")]
    Pre1980,
    /// Buildings constructed after 1980.
    #[serde(rename = "post1980")]
    Post1980,
    /// New construction (ASHRAE 90.1-2004 baseline).
    #[serde(rename = "new")]
    New,
}

impl Vintage {
    /// All vintages in their canonical ordinal order.
    pub const ALL: [Vintage; 3] = [Vintage::Pre1980, Vintage::Post1980, Vintage::New];

    /// Directory label used under `eplus_simulations/`.
    pub fn label(&self) -> &'static str {
        match self {
            Vintage::Pre1980 => "pre1980",
            Vintage::Post1980 => "post1980",
            Vintage::New => "new",
        }
    }
}

impl fmt::Display for Vintage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Vintage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Vintage::ALL
            .iter()
            .find(|v| v.label() == s)
            .copied()
            .ok_or_else(|| format!("unknown vintage '{}'", s))
    }
}

/// Climate projection pathway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scenario {
    /// Present-day typical meteorological year.
    #[serde(rename = "historical")]
    Historical,
    #[serde(rename = "ssp126")]
    Ssp126,
    #[serde(rename = "ssp245")]
    Ssp245,
    #[serde(rename = "ssp585")]
    Ssp585,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Historical,
        Scenario::Ssp126,
        Scenario::Ssp245,
        Scenario::Ssp585,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Scenario::Historical => "historical",
            Scenario::Ssp126 => "ssp126",
            Scenario::Ssp245 => "ssp245",
            Scenario::Ssp585 => "ssp585",
        }
    }

    /// Returns true for the present-day pathway, which only pairs with the baseline year.
    pub fn is_historical(&self) -> bool {
        matches!(self, Scenario::Historical)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .iter()
            .find(|v| v.label() == s)
            .copied()
            .ok_or_else(|| format!("unknown scenario '{}'", s))
    }
}

/// A valid (scenario, year) pairing.
///
/// Its label is `"{scenario}_{year}"`, which is also the name of the results
/// subdirectory for the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioYear {
    pub scenario: Scenario,
    pub year: i32,
}

impl ScenarioYear {
    pub fn new(scenario: Scenario, year: i32) -> Self {
        Self { scenario, year }
    }

    pub fn label(&self) -> String {
        format!("{}_{}", self.scenario, self.year)
    }
}

impl fmt::Display for ScenarioYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.scenario, self.year)
    }
}

impl FromStr for ScenarioYear {
    type Err = String;

    /// Accepts both `ssp245_2050` and `ssp245-2050`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scenario, year) = s
            .rsplit_once(|c: char| c == '_' || c == '-')
            .ok_or_else(|| format!("expected '<scenario>_<year>', got '{}'", s))?;
        let scenario = scenario.parse::<Scenario>()?;
        let year = year
            .parse::<i32>()
            .map_err(|_| format!("invalid year in '{}'", s))?;
        Ok(Self { scenario, year })
    }
}

/// Target years simulated for every future pathway.
pub const DEFAULT_YEARS: [i32; 5] = [2020, 2035, 2050, 2065, 2080];

/// The year represented by present-day weather.
pub const BASELINE_YEAR: i32 = 2020;

/// IECC climate zone codes covered by the reference building set.
pub const CLIMATE_ZONES: [&str; 16] = [
    "1a", "2a", "2b", "3a", "3b", "3bc", "3c", "4a", "4b", "4c", "5a", "5b", "6a", "6b", "7a",
    "8a",
];

/// DOE commercial reference building archetypes.
pub const BUILDING_TYPES: [&str; 16] = [
    "RefBldgFullServiceRestaurant",
    "RefBldgHospital",
    "RefBldgLargeHotel",
    "RefBldgLargeOffice",
    "RefBldgMediumOffice",
    "RefBldgMidriseApartment",
    "RefBldgOutPatient",
    "RefBldgPrimarySchool",
    "RefBldgQuickServiceRestaurant",
    "RefBldgSecondarySchool",
    "RefBldgSmallHotel",
    "RefBldgSmallOffice",
    "RefBldgStand-aloneRetail",
    "RefBldgStripMall",
    "RefBldgSuperMarket",
    "RefBldgWarehouse",
];

/// Descriptive name of a climate zone code, if known.
pub fn climate_zone_name(code: &str) -> Option<&'static str> {
    let name = match code {
        "1a" => "Very Hot Humid",
        "2a" => "Hot Humid",
        "2b" => "Hot Dry",
        "3a" => "Warm Humid",
        "3b" => "Warm Dry",
        "3bc" => "Warm Dry Marine",
        "3c" => "Warm Marine",
        "4a" => "Mixed Humid",
        "4b" => "Mixed Dry",
        "4c" => "Mixed Marine",
        "5a" => "Cool Humid",
        "5b" => "Cold Dry",
        "5c" => "Cool Marine",
        "6a" => "Cold Humid",
        "6b" => "Cold Dry",
        "7a" => "Very Cold",
        "8a" => "Subarctic/Arctic",
        _ => return None,
    };
    Some(name)
}

/// Formats the climatology window centred on `year`, e.g. `2035-2065` for 2050.
pub fn year_band(year: i32, half_width: i32) -> String {
    let (start, end) = year_band_bounds(year, half_width);
    format!("{}-{}", start, end)
}

pub fn year_band_bounds(year: i32, half_width: i32) -> (i32, i32) {
    (year - half_width, year + half_width)
}
