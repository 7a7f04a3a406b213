//! Open-Meteo daily forecast client.
//!
//! One request per run covers the whole horizon. Days where the provider
//! returns a null for any variable are dropped, so later lookups for them
//! report `FeatureUnavailable` instead of feeding a gap to the models.

use super::{DailyWeather, WeatherTable};
use crate::config::{LocationConfig, WeatherConfig};
use crate::error::ForecastError;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const DAILY_VARIABLES: &str = "temperature_2m_min,temperature_2m_max,temperature_2m_mean,\
precipitation_sum,wind_speed_10m_mean,wind_speed_10m_max,wind_direction_10m_dominant";

/// Upper bound on a single retry delay.
const MAX_BACKOFF_MS: u64 = 8_000;

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: DailyBlock,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<String>,
    temperature_2m_min: Vec<Option<f64>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_mean: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
    wind_speed_10m_mean: Vec<Option<f64>>,
    wind_speed_10m_max: Vec<Option<f64>>,
    wind_direction_10m_dominant: Vec<Option<f64>>,
}

impl DailyBlock {
    fn into_table(self) -> Result<WeatherTable, ForecastError> {
        let n = self.time.len();
        let columns = [
            ("temperature_2m_min", self.temperature_2m_min.len()),
            ("temperature_2m_max", self.temperature_2m_max.len()),
            ("temperature_2m_mean", self.temperature_2m_mean.len()),
            ("precipitation_sum", self.precipitation_sum.len()),
            ("wind_speed_10m_mean", self.wind_speed_10m_mean.len()),
            ("wind_speed_10m_max", self.wind_speed_10m_max.len()),
            (
                "wind_direction_10m_dominant",
                self.wind_direction_10m_dominant.len(),
            ),
        ];
        if let Some((name, len)) = columns.iter().find(|(_, len)| *len != n) {
            return Err(ForecastError::weather(format!(
                "daily.{name} has {len} values for {n} dates"
            )));
        }

        let mut table = WeatherTable::new();
        for (i, raw) in self.time.iter().enumerate() {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|e| ForecastError::weather(format!("bad date '{raw}': {e}")))?;
            let day = (|| {
                Some(DailyWeather {
                    temp_min: self.temperature_2m_min[i]?,
                    temp_max: self.temperature_2m_max[i]?,
                    temp_mean: self.temperature_2m_mean[i]?,
                    precipitation_sum: self.precipitation_sum[i]?,
                    wind_speed_mean: self.wind_speed_10m_mean[i]?,
                    wind_speed_max: self.wind_speed_10m_max[i]?,
                    wind_direction_dominant: self.wind_direction_10m_dominant[i]?,
                })
            })();
            match day {
                Some(day) => {
                    table.insert(date, day);
                }
                None => debug!(%date, "Dropping day with incomplete weather data"),
            }
        }
        Ok(table)
    }
}

/// Parse an Open-Meteo `/v1/forecast` body into a weather table.
pub fn parse_forecast(body: &str) -> Result<WeatherTable, ForecastError> {
    let response: ForecastResponse = serde_json::from_str(body)
        .map_err(|e| ForecastError::weather(format!("unexpected response: {e}")))?;
    response.daily.into_table()
}

/// Async client for the Open-Meteo forecast API.
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
    timezone: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenMeteoClient {
    pub fn new(location: &LocationConfig, config: &WeatherConfig) -> Result<Self, ForecastError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("parkcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ForecastError::weather(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
            timezone: location.timezone.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Fetch daily aggregates for `start..=end`.
    pub async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<WeatherTable, ForecastError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(start, end).await {
                Ok(table) => {
                    info!(
                        days = table.len(),
                        %start,
                        %end,
                        "Fetched weather forecast"
                    );
                    return Ok(table);
                }
                Err(FetchFailure::Permanent(e)) => return Err(e),
                Err(FetchFailure::Transient(e)) if attempt < self.max_retries => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying weather fetch after transient error"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(FetchFailure::Transient(e)) => return Err(e),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_backoff.as_millis() as u64;
        Duration::from_millis(base.saturating_mul(1u64 << attempt.min(16)).min(MAX_BACKOFF_MS))
    }

    async fn fetch_once(&self, start: NaiveDate, end: NaiveDate) -> Result<WeatherTable, FetchFailure> {
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let latitude = self.latitude.to_string();
        let longitude = self.longitude.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("daily", DAILY_VARIABLES),
                ("timezone", self.timezone.as_str()),
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchFailure::Transient(ForecastError::weather(format!("request failed: {e}"))))?;

        let status = response.status();
        if !status.is_success() {
            let err = ForecastError::weather(format!("Open-Meteo returned status {status}"));
            return Err(if status.is_client_error() && status.as_u16() != 429 {
                FetchFailure::Permanent(err)
            } else {
                FetchFailure::Transient(err)
            });
        }

        let body = response.text().await.map_err(|e| {
            FetchFailure::Transient(ForecastError::weather(format!("failed to read body: {e}")))
        })?;
        parse_forecast(&body).map_err(FetchFailure::Permanent)
    }
}

enum FetchFailure {
    Transient(ForecastError),
    Permanent(ForecastError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::WeatherLookup;

    const SAMPLE: &str = r#"{
        "latitude": 43.65,
        "longitude": -79.38,
        "timezone": "America/Toronto",
        "daily_units": {"time": "iso8601", "temperature_2m_mean": "°C"},
        "daily": {
            "time": ["2025-11-24", "2025-11-25", "2025-11-26"],
            "temperature_2m_min": [1.2, -0.5, 2.0],
            "temperature_2m_max": [7.9, 4.1, 8.8],
            "temperature_2m_mean": [4.5, 1.8, null],
            "precipitation_sum": [0.0, 3.4, 1.1],
            "wind_speed_10m_mean": [12.0, 15.5, 9.1],
            "wind_speed_10m_max": [22.3, 30.1, 18.0],
            "wind_direction_10m_dominant": [250, 310, 200]
        }
    }"#;

    #[test]
    fn test_parse_forecast_drops_incomplete_days() {
        let table = parse_forecast(SAMPLE).unwrap();
        assert_eq!(table.len(), 2);

        let day = table
            .daily(NaiveDate::from_ymd_opt(2025, 11, 25).unwrap())
            .unwrap();
        assert_eq!(day.temp_mean, 1.8);
        assert_eq!(day.precipitation_sum, 3.4);
        assert_eq!(day.wind_direction_dominant, 310.0);

        let gap = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
        assert!(matches!(
            table.daily(gap),
            Err(ForecastError::FeatureUnavailable { .. })
        ));
    }

    #[test]
    fn test_parse_forecast_rejects_ragged_columns() {
        let body = r#"{"daily": {
            "time": ["2025-11-24", "2025-11-25"],
            "temperature_2m_min": [1.0],
            "temperature_2m_max": [2.0, 3.0],
            "temperature_2m_mean": [1.5, 2.5],
            "precipitation_sum": [0.0, 0.0],
            "wind_speed_10m_mean": [5.0, 5.0],
            "wind_speed_10m_max": [9.0, 9.0],
            "wind_direction_10m_dominant": [90.0, 90.0]
        }}"#;
        let err = parse_forecast(body).unwrap_err();
        assert!(err.to_string().contains("temperature_2m_min has 1 values"));
    }

    #[test]
    fn test_parse_forecast_rejects_error_body() {
        let err = parse_forecast(r#"{"error": true, "reason": "Latitude must be in range"}"#)
            .unwrap_err();
        assert!(matches!(err, ForecastError::Weather { .. }));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let client = OpenMeteoClient::new(
            &LocationConfig::default(),
            &WeatherConfig {
                retry_backoff_ms: 500,
                ..WeatherConfig::default()
            },
        )
        .unwrap();
        assert_eq!(client.backoff(0), Duration::from_millis(500));
        assert_eq!(client.backoff(2), Duration::from_millis(2000));
        assert_eq!(client.backoff(10), Duration::from_millis(MAX_BACKOFF_MS));
    }
}
