//! # Parkcast Core
//!
//! Core library for the parkcast traffic forecaster.
//! Provides the feature builder, holiday calendar, weather lookup, the
//! two-stage predictors, the forecast orchestrator and configuration.

pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod holidays;
pub mod orchestrator;
pub mod pipeline;
pub mod predictor;
pub mod weather;

// Re-export commonly used types at the crate root.
pub use config::{HorizonStart, ParkcastConfig, load_config};
pub use error::ForecastError;
pub use features::{FeatureBuilder, FeatureKey, FeatureRow, STAGE1_FEATURES, STAGE2_FEATURES};
pub use forecast::{DayValue, Forecast, ForecastPoint, ForecastSummary, PointOutcome, Prediction};
pub use holidays::{
    HolidayCalendar, HolidayCategory, HolidayInfo, HolidayKind, HolidayLookup, HolidayPrecedence,
};
pub use orchestrator::{Forecaster, MAX_HORIZON_DAYS, RunMode};
pub use pipeline::Pipeline;
pub use predictor::{
    AugmentedFeatureRow, Stage1Output, Stage1Predictor, Stage1Target, Stage2Predictor, clip_count,
};
pub use weather::{DailyWeather, OpenMeteoClient, WeatherLookup, WeatherSummary, WeatherTable};
