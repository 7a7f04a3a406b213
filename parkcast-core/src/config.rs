//! Configuration system for parkcast.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit config file -> environment.
//! Configuration is loaded from `~/.config/parkcast/config.toml` and/or
//! `.parkcast/config.toml` in the workspace directory.

use crate::error::ForecastError;
use crate::holidays::{HolidayCalendar, HolidayPrecedence};
use crate::orchestrator::{MAX_HORIZON_DAYS, RunMode};
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use parkcast_ml::ModelVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParkcastConfig {
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub forecast: ForecastSettings,
    #[serde(default)]
    pub holidays: HolidayConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The place being forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone used for "today" and for daily weather aggregation.
    pub timezone: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            name: "Toronto".to_string(),
            latitude: 43.6532,
            longitude: -79.3832,
            timezone: "America/Toronto".to_string(),
        }
    }
}

impl LocationConfig {
    pub fn tz(&self) -> Result<Tz, ForecastError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ForecastError::config(format!("unknown timezone '{}'", self.timezone)))
    }

    /// Current calendar date at the location.
    pub fn today(&self) -> Result<NaiveDate, ForecastError> {
        Ok(Utc::now().with_timezone(&self.tz()?).date_naive())
    }
}

/// Whether the horizon begins on the run date or the day after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonStart {
    #[default]
    Today,
    Tomorrow,
}

impl HorizonStart {
    pub fn start_date(self, run_date: NaiveDate) -> NaiveDate {
        match self {
            HorizonStart::Today => run_date,
            HorizonStart::Tomorrow => run_date + Duration::days(1),
        }
    }
}

/// Forecast run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSettings {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: usize,
    #[serde(default)]
    pub start: HorizonStart,
    #[serde(default)]
    pub mode: RunMode,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            start: HorizonStart::default(),
            mode: RunMode::default(),
        }
    }
}

fn default_horizon_days() -> usize {
    MAX_HORIZON_DAYS
}

/// A configured extra holiday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomHoliday {
    pub date: NaiveDate,
    pub name: String,
}

/// Holiday calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolidayConfig {
    /// Flag Saturdays and Sundays as holidays, as the training data does.
    #[serde(default = "default_true")]
    pub weekends_as_holidays: bool,
    /// Include Black Friday, Christmas Eve and New Year's Eve.
    #[serde(default = "default_true")]
    pub special_days: bool,
    #[serde(default)]
    pub precedence: HolidayPrecedence,
    #[serde(default)]
    pub custom: Vec<CustomHoliday>,
}

impl Default for HolidayConfig {
    fn default() -> Self {
        Self {
            weekends_as_holidays: true,
            special_days: true,
            precedence: HolidayPrecedence::default(),
            custom: Vec::new(),
        }
    }
}

impl HolidayConfig {
    pub fn calendar(&self) -> HolidayCalendar {
        self.custom.iter().fold(
            HolidayCalendar::new()
                .with_weekends_as_holidays(self.weekends_as_holidays)
                .with_special_days(self.special_days)
                .with_precedence(self.precedence),
            |calendar, c| calendar.with_custom(c.date, c.name.clone()),
        )
    }
}

/// A model reference in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    #[serde(default)]
    pub version: ModelVersion,
}

impl ModelRef {
    fn new(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            version: ModelVersion::Exact(version),
        }
    }
}

/// Model store location and the three models of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub store_dir: PathBuf,
    pub visitors: ModelRef,
    pub vehicles: ModelRef,
    pub traffic: ModelRef,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".parkcast/models"),
            visitors: ModelRef::new("traffic_flow_visitors_xgboost_model", 4),
            vehicles: ModelRef::new("traffic_flow_vehicles_xgboost_model", 4),
            traffic: ModelRef::new("traffic_flow_xgboost_model", 7),
        }
    }
}

/// Weather provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_weather_timeout")]
    pub timeout_secs: u64,
    /// Additional attempts after the first failed request.
    #[serde(default = "default_weather_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            timeout_secs: default_weather_timeout(),
            max_retries: default_weather_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_weather_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_weather_timeout() -> u64 {
    30
}

fn default_weather_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Where run artifacts go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub html_file: String,
    #[serde(default = "default_true")]
    pub write_html: bool,
    #[serde(default = "default_true")]
    pub write_csv: bool,
    #[serde(default = "default_true")]
    pub write_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./dashboard"),
            html_file: "traffic_dashboard.html".to_string(),
            write_html: true,
            write_csv: true,
            write_json: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl ParkcastConfig {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ForecastError> {
        let horizon = self.forecast.horizon_days;
        if horizon == 0 || horizon > MAX_HORIZON_DAYS {
            return Err(ForecastError::InvalidHorizon {
                requested: horizon,
                max: MAX_HORIZON_DAYS,
            });
        }
        if !(-90.0..=90.0).contains(&self.location.latitude) {
            return Err(ForecastError::config(format!(
                "latitude {} out of range",
                self.location.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.location.longitude) {
            return Err(ForecastError::config(format!(
                "longitude {} out of range",
                self.location.longitude
            )));
        }
        self.location.tz()?;
        if self.weather.base_url.trim().is_empty() {
            return Err(ForecastError::config("weather.base_url is empty"));
        }
        if self.output.html_file.contains(['/', '\\']) {
            return Err(ForecastError::config(
                "output.html_file must be a file name, not a path",
            ));
        }
        Ok(())
    }
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "parkcast", "parkcast")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration with layered sources.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<ParkcastConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ParkcastConfig::default()));

    // User-level config
    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".parkcast").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Explicit file from the command line
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (PARKCAST_FORECAST__HORIZON_DAYS, PARKCAST_LOCATION__NAME, etc.)
    figment = figment.merge(Env::prefixed("PARKCAST_").split("__"));

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holidays::HolidayLookup;

    #[test]
    fn test_default_config() {
        let config = ParkcastConfig::default();
        assert_eq!(config.location.name, "Toronto");
        assert_eq!(config.forecast.horizon_days, 7);
        assert_eq!(config.forecast.start, HorizonStart::Today);
        assert_eq!(config.forecast.mode, RunMode::Strict);
        assert_eq!(config.models.traffic.version, ModelVersion::Exact(7));
        assert!(config.holidays.weekends_as_holidays);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = ParkcastConfig::default();
        config.holidays.custom.push(CustomHoliday {
            date: NaiveDate::from_ymd_opt(2025, 8, 2).unwrap(),
            name: "Caribbean Carnival".to_string(),
        });
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ParkcastConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.models.visitors, config.models.visitors);
        assert_eq!(parsed.holidays.custom, config.holidays.custom);
        assert_eq!(parsed.output.html_file, config.output.html_file);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: ParkcastConfig = toml::from_str(
            r#"
            [forecast]
            start = "tomorrow"
            mode = "best_effort"

            [holidays]
            precedence = "custom_first"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.forecast.horizon_days, 7);
        assert_eq!(parsed.forecast.start, HorizonStart::Tomorrow);
        assert_eq!(parsed.forecast.mode, RunMode::BestEffort);
        assert_eq!(parsed.holidays.precedence, HolidayPrecedence::CustomFirst);
        assert!(parsed.holidays.special_days);
        assert_eq!(parsed.location.timezone, "America/Toronto");
    }

    #[test]
    fn test_validate_rejects_long_horizon() {
        let mut config = ParkcastConfig::default();
        config.forecast.horizon_days = 14;
        assert!(matches!(
            config.validate(),
            Err(ForecastError::InvalidHorizon {
                requested: 14,
                max: 7
            })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_timezone_and_coordinates() {
        let mut config = ParkcastConfig::default();
        config.location.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        let mut config = ParkcastConfig::default();
        config.location.latitude = 123.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_horizon_start() {
        let run = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(HorizonStart::Today.start_date(run), run);
        assert_eq!(
            HorizonStart::Tomorrow.start_date(run),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_holiday_config_builds_calendar() {
        let config = HolidayConfig {
            weekends_as_holidays: false,
            special_days: false,
            precedence: HolidayPrecedence::CustomFirst,
            custom: vec![CustomHoliday {
                date: NaiveDate::from_ymd_opt(2025, 11, 28).unwrap(),
                name: "Black Friday".to_string(),
            }],
        };
        let calendar = config.calendar();
        let info = calendar.lookup(NaiveDate::from_ymd_opt(2025, 11, 28).unwrap());
        assert_eq!(info.name.as_deref(), Some("Black Friday"));
        let saturday = calendar.lookup(NaiveDate::from_ymd_opt(2025, 11, 29).unwrap());
        assert!(!saturday.is_holiday);
    }

    #[test]
    fn test_load_config_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parkcast.toml");
        std::fs::write(
            &path,
            r#"
            [location]
            name = "Ottawa"
            latitude = 45.4215
            longitude = -75.6972
            timezone = "America/Toronto"

            [models.traffic]
            name = "ottawa_traffic"
            version = "latest"
            "#,
        )
        .unwrap();
        let config = load_config(Some(dir.path()), Some(&path)).unwrap();
        assert_eq!(config.location.name, "Ottawa");
        assert_eq!(config.models.traffic.name, "ottawa_traffic");
        assert_eq!(config.models.traffic.version, ModelVersion::Latest);
        assert_eq!(config.models.visitors.version, ModelVersion::Exact(4));
    }
}
