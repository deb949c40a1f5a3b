//! Daily driving data and the weather provider seam.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::WeatherError;
use crate::Day;

/// One day of meteorological driving variables.
///
/// Units follow the usual crop-model conventions: radiation in J/m2/day,
/// temperatures in degrees C, vapour pressure in hPa, rain in cm/day,
/// wind in m/s and reference evapotranspiration in cm/day.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DrivingData {
    /// Global radiation.
    pub irrad: f64,
    /// Minimum temperature.
    pub tmin: f64,
    /// Maximum temperature.
    pub tmax: f64,
    /// Vapour pressure.
    pub vap: f64,
    /// Precipitation.
    pub rain: f64,
    /// Mean wind speed at 2 m.
    pub wind: f64,
    /// Open water evaporation.
    pub e0: f64,
    /// Bare soil evaporation.
    pub es0: f64,
    /// Reference crop evapotranspiration.
    pub et0: f64,
    /// Daily mean temperature. Derived as `(tmin + tmax) / 2` when absent.
    #[serde(default)]
    pub temp: Option<f64>,
    /// Daytime mean temperature. Derived as `(temp + tmax) / 2` when absent.
    #[serde(default)]
    pub dtemp: Option<f64>,
}

impl DrivingData {
    /// Fill in `temp` and `dtemp` when the provider did not supply them.
    pub fn with_derived(mut self) -> Self {
        let temp = *self.temp.get_or_insert((self.tmin + self.tmax) / 2.0);
        self.dtemp.get_or_insert((temp + self.tmax) / 2.0);
        self
    }

    /// Daily mean temperature, derived if necessary.
    pub fn temp(&self) -> f64 {
        self.temp.unwrap_or((self.tmin + self.tmax) / 2.0)
    }

    /// Daytime mean temperature, derived if necessary.
    pub fn dtemp(&self) -> f64 {
        self.dtemp.unwrap_or((self.temp() + self.tmax) / 2.0)
    }
}

/// Source of daily driving data, addressed by simulated day.
///
/// Called once per step by the engine. Implementations are expected to be
/// synchronous; a slow provider simply slows the run.
pub trait WeatherProvider {
    /// Driving data for `day`.
    fn driving_data(&self, day: Day) -> Result<DrivingData, WeatherError>;
}

/// In-memory weather provider backed by a day-indexed table.
#[derive(Clone, Debug, Default)]
pub struct WeatherTable {
    records: IndexMap<Day, DrivingData>,
}

impl WeatherTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `day`.
    pub fn insert(&mut self, day: Day, data: DrivingData) {
        self.records.insert(day, data);
    }

    /// Number of days covered.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<(Day, DrivingData)> for WeatherTable {
    fn from_iter<I: IntoIterator<Item = (Day, DrivingData)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl WeatherProvider for WeatherTable {
    fn driving_data(&self, day: Day) -> Result<DrivingData, WeatherError> {
        self.records
            .get(&day)
            .cloned()
            .ok_or(WeatherError::MissingDay { day })
    }
}
