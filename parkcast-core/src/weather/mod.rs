//! Daily weather aggregates and the lookup interface the feature builder consumes.
//!
//! Forecast data is fetched once per run (see [`open_meteo`]) into a
//! [`WeatherTable`], which then serves every lookup for that run.

pub mod open_meteo;

use crate::error::ForecastError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use open_meteo::OpenMeteoClient;

/// Aggregated weather for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    /// °C
    pub temp_min: f64,
    /// °C
    pub temp_max: f64,
    /// °C
    pub temp_mean: f64,
    /// mm
    pub precipitation_sum: f64,
    /// km/h
    pub wind_speed_mean: f64,
    /// km/h
    pub wind_speed_max: f64,
    /// degrees
    pub wind_direction_dominant: f64,
}

/// Capability interface over a weather forecast provider.
///
/// Fails with [`ForecastError::FeatureUnavailable`] when the provider has no
/// data for the date (for example, beyond its forecast horizon).
pub trait WeatherLookup {
    fn daily(&self, date: NaiveDate) -> Result<DailyWeather, ForecastError>;
}

impl<F> WeatherLookup for F
where
    F: Fn(NaiveDate) -> Result<DailyWeather, ForecastError>,
{
    fn daily(&self, date: NaiveDate) -> Result<DailyWeather, ForecastError> {
        self(date)
    }
}

/// Per-run cache of daily weather keyed by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherTable {
    days: BTreeMap<NaiveDate, DailyWeather>,
}

impl WeatherTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, weather: DailyWeather) -> Option<DailyWeather> {
        self.days.insert(date, weather)
    }

    pub fn remove(&mut self, date: NaiveDate) -> Option<DailyWeather> {
        self.days.remove(&date)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// First and last covered dates.
    pub fn coverage(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.days.keys().next()?;
        let last = self.days.keys().next_back()?;
        Some((*first, *last))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &DailyWeather)> {
        self.days.iter()
    }
}

impl FromIterator<(NaiveDate, DailyWeather)> for WeatherTable {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, DailyWeather)>>(iter: I) -> Self {
        Self {
            days: iter.into_iter().collect(),
        }
    }
}

impl WeatherLookup for WeatherTable {
    fn daily(&self, date: NaiveDate) -> Result<DailyWeather, ForecastError> {
        self.days.get(&date).copied().ok_or_else(|| {
            let reason = match self.coverage() {
                Some((first, last)) => {
                    format!("no weather data (provider covers {first} to {last})")
                }
                None => "no weather data loaded".to_string(),
            };
            ForecastError::feature_unavailable(date, reason)
        })
    }
}

/// Weather figures shown next to a forecast point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub temp_mean: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub precipitation_sum: f64,
    pub wind_speed_max: f64,
}

impl From<&DailyWeather> for WeatherSummary {
    fn from(w: &DailyWeather) -> Self {
        Self {
            temp_mean: w.temp_mean,
            temp_min: w.temp_min,
            temp_max: w.temp_max,
            precipitation_sum: w.precipitation_sum,
            wind_speed_max: w.wind_speed_max,
        }
    }
}
