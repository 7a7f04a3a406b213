//! Error types for the forecasting core.
//!
//! Uses `thiserror` for the public error type. Only [`ForecastError::FeatureUnavailable`]
//! describes a per-day condition; every other variant means the run as a whole
//! cannot produce a trustworthy forecast.

use chrono::NaiveDate;
use parkcast_ml::MlError;

/// Top-level error type for the forecasting pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("Feature unavailable for {date}: {reason}")]
    FeatureUnavailable { date: NaiveDate, reason: String },

    #[error("Schema mismatch for {model}: {detail}")]
    SchemaMismatch { model: String, detail: String },

    #[error("Failed to load model '{name}' (version {version}): {source}")]
    ModelLoadFailure {
        name: String,
        version: String,
        #[source]
        source: MlError,
    },

    #[error("Model {model} failed to evaluate: {source}")]
    Evaluation {
        model: String,
        #[source]
        source: MlError,
    },

    #[error("Forecast points are not consecutive: expected {expected}, found {found}")]
    NonConsecutivePoints { expected: NaiveDate, found: NaiveDate },

    #[error("Invalid horizon of {requested} days (supported: 1..={max})")]
    InvalidHorizon { requested: usize, max: usize },

    #[error("Weather provider error: {message}")]
    Weather { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ForecastError {
    pub fn feature_unavailable(date: NaiveDate, reason: impl Into<String>) -> Self {
        Self::FeatureUnavailable {
            date,
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(model: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            model: model.into(),
            detail: detail.into(),
        }
    }

    pub fn weather(message: impl Into<String>) -> Self {
        Self::Weather {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether a later retry (or a shorter horizon) could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::FeatureUnavailable { .. } | ForecastError::Weather { .. }
        )
    }
}
