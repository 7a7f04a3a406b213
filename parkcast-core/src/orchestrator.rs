//! Runs the pipeline over a horizon of consecutive days.

use crate::error::ForecastError;
use crate::forecast::{Forecast, ForecastPoint};
use crate::holidays::HolidayLookup;
use crate::pipeline::Pipeline;
use crate::weather::WeatherLookup;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

/// Longest supported horizon, bounded by the weather provider.
pub const MAX_HORIZON_DAYS: usize = 7;

/// How per-day failures are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Any failure aborts the run.
    #[default]
    Strict,
    /// Days with unavailable features become `Unavailable` points.
    BestEffort,
}

/// Produces a [`Forecast`] from a pipeline and its two lookups.
pub struct Forecaster<W, H> {
    pipeline: Pipeline,
    weather: W,
    holidays: H,
}

impl<W: WeatherLookup, H: HolidayLookup> Forecaster<W, H> {
    pub fn new(pipeline: Pipeline, weather: W, holidays: H) -> Self {
        Self {
            pipeline,
            weather,
            holidays,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Forecast `horizon` days starting at `start_date`.
    pub fn forecast(
        &self,
        start_date: NaiveDate,
        horizon: usize,
        mode: RunMode,
    ) -> Result<Forecast, ForecastError> {
        if horizon == 0 || horizon > MAX_HORIZON_DAYS {
            return Err(ForecastError::InvalidHorizon {
                requested: horizon,
                max: MAX_HORIZON_DAYS,
            });
        }
        let span = info_span!("forecast", start = %start_date, horizon, ?mode);
        let _enter = span.enter();
        info!("Starting forecast run");

        let mut points = Vec::with_capacity(horizon);
        for date in start_date.iter_days().take(horizon) {
            match self.pipeline.predict_day(date, &self.weather, &self.holidays) {
                Ok((holiday, prediction)) => {
                    points.push(ForecastPoint::predicted(date, holiday, prediction));
                }
                Err(ForecastError::FeatureUnavailable { date, reason })
                    if mode == RunMode::BestEffort =>
                {
                    warn!(%date, %reason, "Day unavailable, continuing");
                    points.push(ForecastPoint::unavailable(
                        date,
                        self.holidays.lookup(date),
                        reason,
                    ));
                }
                Err(e) => {
                    error!(%date, error = %e, "Forecast run aborted");
                    return Err(e);
                }
            }
        }
        if points.len() < horizon {
            return Err(ForecastError::InvalidHorizon {
                requested: horizon,
                max: points.len(),
            });
        }

        let forecast = Forecast::new(start_date, Utc::now(), mode, points)?;
        let summary = forecast.summary();
        info!(
            available = summary.available_days,
            unavailable = summary.unavailable_days,
            avg_traffic_flow = summary.avg_traffic_flow.unwrap_or(0.0),
            "Forecast run complete"
        );
        Ok(forecast)
    }
}
