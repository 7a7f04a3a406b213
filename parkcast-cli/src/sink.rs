//! Prediction files: `predictions_YYYYMMDD.csv` and `.json`.

use anyhow::Context;
use chrono::NaiveDate;
use parkcast_core::config::LocationConfig;
use parkcast_core::{Forecast, ForecastSummary, PointOutcome};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const CSV_HEADER: &str = "date,is_holiday,holiday_name,status,predicted_visitors,predicted_vehicles,predicted_traffic_flow,temperature_2m_mean,precipitation_sum,reason";

fn file_name(run_date: NaiveDate, ext: &str) -> String {
    format!("predictions_{}.{ext}", run_date.format("%Y%m%d"))
}

/// Write via a temporary sibling file so readers never see a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move output into place at {}", path.display()))?;
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn number(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_default()
}

/// Render the forecast as CSV, one row per day.
pub fn to_csv(forecast: &Forecast) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for point in forecast.points() {
        let holiday = point.holiday();
        let (status, prediction, reason) = match point.outcome() {
            PointOutcome::Predicted(p) => ("predicted", Some(p), ""),
            PointOutcome::Unavailable { reason } => ("unavailable", None, reason.as_str()),
        };
        let weather = prediction.and_then(|p| p.weather);
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{}",
            point.date(),
            u8::from(holiday.is_holiday),
            csv_field(holiday.name.as_deref().unwrap_or("")),
            status,
            number(prediction.map(|p| p.visitors), 2),
            number(prediction.map(|p| p.vehicles), 2),
            number(prediction.map(|p| p.traffic_flow), 2),
            number(weather.map(|w| w.temp_mean), 1),
            number(weather.map(|w| w.precipitation_sum), 1),
            csv_field(reason),
        );
    }
    out
}

pub fn write_csv(dir: &Path, run_date: NaiveDate, forecast: &Forecast) -> anyhow::Result<PathBuf> {
    let path = dir.join(file_name(run_date, "csv"));
    write_atomic(&path, to_csv(forecast).as_bytes())?;
    Ok(path)
}

#[derive(Serialize)]
struct Export<'a> {
    location: &'a LocationConfig,
    #[serde(flatten)]
    forecast: &'a Forecast,
    summary: ForecastSummary,
}

pub fn to_json(location: &LocationConfig, forecast: &Forecast) -> anyhow::Result<String> {
    let export = Export {
        location,
        forecast,
        summary: forecast.summary(),
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

pub fn write_json(
    dir: &Path,
    run_date: NaiveDate,
    location: &LocationConfig,
    forecast: &Forecast,
) -> anyhow::Result<PathBuf> {
    let path = dir.join(file_name(run_date, "json"));
    write_atomic(&path, to_json(location, forecast)?.as_bytes())?;
    Ok(path)
}
