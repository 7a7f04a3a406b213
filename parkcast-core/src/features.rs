//! Feature construction for one forecast day.
//!
//! A [`FeatureBuilder`] is bound to the Stage 1 schema at construction time:
//! every schema field is resolved to a [`FeatureKey`] once, so building a row
//! is a straight walk over the keys.

use crate::error::ForecastError;
use crate::holidays::{HolidayInfo, HolidayLookup, rules};
use crate::weather::{DailyWeather, WeatherLookup};
use chrono::{Datelike, NaiveDate};
use parkcast_ml::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Feature names of the production Stage 1 models, in training order.
pub const STAGE1_FEATURES: [&str; 5] = [
    "holidays",
    "temperature_2m_mean",
    "precipitation_sum",
    "wind_speed_10m_max",
    "wind_direction_10m_dominant",
];

/// Feature names of the production Stage 2 model, in training order.
pub const STAGE2_FEATURES: [&str; 7] = [
    "visitors",
    "holidays",
    "vehicles",
    "temperature_2m_mean",
    "precipitation_sum",
    "wind_speed_10m_max",
    "wind_direction_10m_dominant",
];

/// Every field the pipeline knows how to supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKey {
    DayOfWeek,
    DayOfMonth,
    Month,
    IsWeekend,
    IsHoliday,
    HolidayCode,
    DaysToHoliday,
    DaysFromHoliday,
    TempMin,
    TempMax,
    TempMean,
    PrecipitationSum,
    WindSpeedMean,
    WindSpeedMax,
    WindDirectionDominant,
    PredictedVisitors,
    PredictedVehicles,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 17] = [
        FeatureKey::DayOfWeek,
        FeatureKey::DayOfMonth,
        FeatureKey::Month,
        FeatureKey::IsWeekend,
        FeatureKey::IsHoliday,
        FeatureKey::HolidayCode,
        FeatureKey::DaysToHoliday,
        FeatureKey::DaysFromHoliday,
        FeatureKey::TempMin,
        FeatureKey::TempMax,
        FeatureKey::TempMean,
        FeatureKey::PrecipitationSum,
        FeatureKey::WindSpeedMean,
        FeatureKey::WindSpeedMax,
        FeatureKey::WindDirectionDominant,
        FeatureKey::PredictedVisitors,
        FeatureKey::PredictedVehicles,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeatureKey::DayOfWeek => "day_of_week",
            FeatureKey::DayOfMonth => "day_of_month",
            FeatureKey::Month => "month",
            FeatureKey::IsWeekend => "is_weekend",
            FeatureKey::IsHoliday => "is_holiday",
            FeatureKey::HolidayCode => "holiday_code",
            FeatureKey::DaysToHoliday => "days_to_holiday",
            FeatureKey::DaysFromHoliday => "days_from_holiday",
            FeatureKey::TempMin => "temp_min",
            FeatureKey::TempMax => "temp_max",
            FeatureKey::TempMean => "temp_mean",
            FeatureKey::PrecipitationSum => "precipitation_sum",
            FeatureKey::WindSpeedMean => "wind_speed_mean",
            FeatureKey::WindSpeedMax => "wind_speed_max",
            FeatureKey::WindDirectionDominant => "wind_direction_dominant",
            FeatureKey::PredictedVisitors => "predicted_visitors",
            FeatureKey::PredictedVehicles => "predicted_vehicles",
        }
    }

    /// Resolve a schema field name, accepting the Open-Meteo and training column names.
    pub fn from_name(name: &str) -> Option<Self> {
        let key = match name.trim().to_ascii_lowercase().as_str() {
            "day_of_week" | "dayofweek" | "weekday" => FeatureKey::DayOfWeek,
            "day_of_month" | "day" => FeatureKey::DayOfMonth,
            "month" => FeatureKey::Month,
            "is_weekend" | "weekend" => FeatureKey::IsWeekend,
            "is_holiday" | "holidays" | "holiday" => FeatureKey::IsHoliday,
            "holiday_code" | "holiday_category" => FeatureKey::HolidayCode,
            "days_to_holiday" | "days_to_next_holiday" => FeatureKey::DaysToHoliday,
            "days_from_holiday" | "days_since_holiday" | "days_from_previous_holiday" => {
                FeatureKey::DaysFromHoliday
            }
            "temp_min" | "temperature_2m_min" => FeatureKey::TempMin,
            "temp_max" | "temperature_2m_max" => FeatureKey::TempMax,
            "temp_mean" | "temperature_2m_mean" => FeatureKey::TempMean,
            "precipitation_sum" | "precipitation" => FeatureKey::PrecipitationSum,
            "wind_speed_mean" | "wind_speed_10m_mean" => FeatureKey::WindSpeedMean,
            "wind_speed_max" | "wind_speed_10m_max" => FeatureKey::WindSpeedMax,
            "wind_direction_dominant" | "wind_direction_10m_dominant" => {
                FeatureKey::WindDirectionDominant
            }
            "predicted_visitors" | "visitors" => FeatureKey::PredictedVisitors,
            "predicted_vehicles" | "vehicles" => FeatureKey::PredictedVehicles,
            _ => return None,
        };
        Some(key)
    }

    pub fn is_weather(self) -> bool {
        matches!(
            self,
            FeatureKey::TempMin
                | FeatureKey::TempMax
                | FeatureKey::TempMean
                | FeatureKey::PrecipitationSum
                | FeatureKey::WindSpeedMean
                | FeatureKey::WindSpeedMax
                | FeatureKey::WindDirectionDominant
        )
    }

    /// Fields produced by Stage 1 rather than by the feature builder.
    pub fn is_stage1_output(self) -> bool {
        matches!(
            self,
            FeatureKey::PredictedVisitors | FeatureKey::PredictedVehicles
        )
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve every field of `schema`, reporting all unknown names at once.
pub(crate) fn resolve_keys(
    schema: &FeatureSchema,
    owner: &str,
) -> Result<Vec<FeatureKey>, ForecastError> {
    let mut keys = Vec::with_capacity(schema.len());
    let mut unknown = Vec::new();
    for name in schema.names() {
        match FeatureKey::from_name(name) {
            Some(key) => keys.push(key),
            None => unknown.push(name.to_string()),
        }
    }
    if unknown.is_empty() {
        Ok(keys)
    } else {
        Err(ForecastError::schema_mismatch(
            owner,
            format!("unknown feature(s) [{}]", unknown.join(", ")),
        ))
    }
}

/// Feature values for one date, ordered by the schema that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    date: NaiveDate,
    schema: Arc<FeatureSchema>,
    keys: Arc<[FeatureKey]>,
    values: Vec<f64>,
    holiday: HolidayInfo,
    weather: Option<DailyWeather>,
}

impl FeatureRow {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn holiday(&self) -> &HolidayInfo {
        &self.holiday
    }

    /// Weather used for this row; `None` when the schema has no weather field.
    pub fn weather(&self) -> Option<&DailyWeather> {
        self.weather.as_ref()
    }

    /// Value of a schema field by its exact name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema.position(name).map(|i| self.values[i])
    }

    /// Value of the first field that resolves to `key`.
    pub fn value_of(&self, key: FeatureKey) -> Option<f64> {
        self.keys
            .iter()
            .position(|k| *k == key)
            .map(|i| self.values[i])
    }
}

/// Builds [`FeatureRow`]s for a fixed schema.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    schema: Arc<FeatureSchema>,
    keys: Arc<[FeatureKey]>,
    needs_weather: bool,
}

impl FeatureBuilder {
    /// Fails with `SchemaMismatch` if a field is unknown or is a Stage 1 output.
    pub fn new(schema: FeatureSchema) -> Result<Self, ForecastError> {
        let keys = resolve_keys(&schema, "feature builder")?;
        let outputs: Vec<&str> = schema
            .names()
            .zip(&keys)
            .filter(|(_, k)| k.is_stage1_output())
            .map(|(name, _)| name)
            .collect();
        if !outputs.is_empty() {
            return Err(ForecastError::schema_mismatch(
                "feature builder",
                format!(
                    "schema contains Stage 1 output field(s) [{}]",
                    outputs.join(", ")
                ),
            ));
        }
        let needs_weather = keys.iter().any(|k| k.is_weather());
        Ok(Self {
            schema: Arc::new(schema),
            keys: keys.into(),
            needs_weather,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn keys(&self) -> &[FeatureKey] {
        &self.keys
    }

    pub fn needs_weather(&self) -> bool {
        self.needs_weather
    }

    /// Build the row for `date`. Fails only with `FeatureUnavailable` from weather.
    pub fn build(
        &self,
        date: NaiveDate,
        weather: &dyn WeatherLookup,
        holidays: &dyn HolidayLookup,
    ) -> Result<FeatureRow, ForecastError> {
        let holiday = holidays.lookup(date);
        let daily = if self.needs_weather {
            Some(weather.daily(date)?)
        } else {
            None
        };

        let values = self
            .keys
            .iter()
            .map(|&key| match daily {
                Some(ref w) if key.is_weather() => weather_value(key, w),
                _ => calendar_value(key, date, &holiday),
            })
            .collect();

        trace!(%date, holiday = ?holiday.name, "Built feature row");
        Ok(FeatureRow {
            date,
            schema: Arc::clone(&self.schema),
            keys: Arc::clone(&self.keys),
            values,
            holiday,
            weather: daily,
        })
    }
}

fn weather_value(key: FeatureKey, w: &DailyWeather) -> f64 {
    match key {
        FeatureKey::TempMin => w.temp_min,
        FeatureKey::TempMax => w.temp_max,
        FeatureKey::TempMean => w.temp_mean,
        FeatureKey::PrecipitationSum => w.precipitation_sum,
        FeatureKey::WindSpeedMean => w.wind_speed_mean,
        FeatureKey::WindSpeedMax => w.wind_speed_max,
        FeatureKey::WindDirectionDominant => w.wind_direction_dominant,
        _ => f64::NAN,
    }
}

fn calendar_value(key: FeatureKey, date: NaiveDate, holiday: &HolidayInfo) -> f64 {
    match key {
        FeatureKey::DayOfWeek => f64::from(date.weekday().num_days_from_monday()),
        FeatureKey::DayOfMonth => f64::from(date.day()),
        FeatureKey::Month => f64::from(date.month()),
        FeatureKey::IsWeekend => bool_value(rules::is_weekend(date)),
        FeatureKey::IsHoliday => bool_value(holiday.is_holiday),
        FeatureKey::HolidayCode => f64::from(holiday.category().code()),
        FeatureKey::DaysToHoliday => rules::days_to_next_statutory(date) as f64,
        FeatureKey::DaysFromHoliday => rules::days_since_previous_statutory(date) as f64,
        // Unreachable for builder-resolved keys.
        _ => f64::NAN,
    }
}

fn bool_value(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}
