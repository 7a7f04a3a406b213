//! Forecast results and the run summary derived from them.

use crate::error::ForecastError;
use crate::holidays::HolidayInfo;
use crate::orchestrator::{MAX_HORIZON_DAYS, RunMode};
use crate::weather::WeatherSummary;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Model outputs for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub visitors: f64,
    pub vehicles: f64,
    pub traffic_flow: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherSummary>,
}

/// Whether a day was predicted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PointOutcome {
    Predicted(Prediction),
    Unavailable { reason: String },
}

/// One day of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    date: NaiveDate,
    holiday: HolidayInfo,
    #[serde(flatten)]
    outcome: PointOutcome,
}

impl ForecastPoint {
    pub fn predicted(date: NaiveDate, holiday: HolidayInfo, prediction: Prediction) -> Self {
        Self {
            date,
            holiday,
            outcome: PointOutcome::Predicted(prediction),
        }
    }

    pub fn unavailable(date: NaiveDate, holiday: HolidayInfo, reason: impl Into<String>) -> Self {
        Self {
            date,
            holiday,
            outcome: PointOutcome::Unavailable {
                reason: reason.into(),
            },
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn holiday(&self) -> &HolidayInfo {
        &self.holiday
    }

    pub fn outcome(&self) -> &PointOutcome {
        &self.outcome
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match &self.outcome {
            PointOutcome::Predicted(p) => Some(p),
            PointOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.prediction().is_some()
    }
}

/// A complete forecast: consecutive days starting at `start_date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    start_date: NaiveDate,
    generated_at: DateTime<Utc>,
    mode: RunMode,
    points: Vec<ForecastPoint>,
}

impl Forecast {
    /// Fails unless `points` are 1..=7 consecutive days beginning at `start_date`.
    pub fn new(
        start_date: NaiveDate,
        generated_at: DateTime<Utc>,
        mode: RunMode,
        points: Vec<ForecastPoint>,
    ) -> Result<Self, ForecastError> {
        if points.is_empty() || points.len() > MAX_HORIZON_DAYS {
            return Err(ForecastError::InvalidHorizon {
                requested: points.len(),
                max: MAX_HORIZON_DAYS,
            });
        }
        let mut expected = Some(start_date);
        for point in &points {
            match expected {
                Some(date) if date == point.date => {}
                Some(date) => {
                    return Err(ForecastError::NonConsecutivePoints {
                        expected: date,
                        found: point.date,
                    });
                }
                // start_date + n ran past NaiveDate::MAX
                None => {
                    return Err(ForecastError::NonConsecutivePoints {
                        expected: start_date,
                        found: point.date,
                    });
                }
            }
            expected = point.date.succ_opt();
        }
        Ok(Self {
            start_date,
            generated_at,
            mode,
            points,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.points
            .last()
            .map(|p| p.date)
            .unwrap_or(self.start_date)
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Predicted days with their outputs.
    pub fn available(&self) -> impl Iterator<Item = (&ForecastPoint, &Prediction)> {
        self.points
            .iter()
            .filter_map(|p| p.prediction().map(|pred| (p, pred)))
    }

    pub fn summary(&self) -> ForecastSummary {
        ForecastSummary::from(self)
    }
}

/// Traffic flow on a particular day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// Aggregates over the available days of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSummary {
    pub days: usize,
    pub available_days: usize,
    pub unavailable_days: usize,
    pub holiday_days: usize,
    pub avg_visitors: Option<f64>,
    pub avg_vehicles: Option<f64>,
    pub avg_traffic_flow: Option<f64>,
    pub total_traffic_flow: f64,
    pub peak_traffic: Option<DayValue>,
    pub lowest_traffic: Option<DayValue>,
}

impl From<&Forecast> for ForecastSummary {
    fn from(forecast: &Forecast) -> Self {
        let available: Vec<(&ForecastPoint, &Prediction)> = forecast.available().collect();
        let n = available.len();
        let mean = |f: fn(&Prediction) -> f64| -> Option<f64> {
            (n > 0).then(|| available.iter().map(|(_, p)| f(p)).sum::<f64>() / n as f64)
        };
        let traffic = available.iter().map(|(point, p)| DayValue {
            date: point.date(),
            value: p.traffic_flow,
        });
        // Ties go to the earliest day.
        let peak = traffic
            .clone()
            .fold(None, |best: Option<DayValue>, d| match best {
                Some(b) if b.value >= d.value => Some(b),
                _ => Some(d),
            });
        let lowest = traffic.fold(None, |best: Option<DayValue>, d| match best {
            Some(b) if b.value <= d.value => Some(b),
            _ => Some(d),
        });

        Self {
            days: forecast.len(),
            available_days: n,
            unavailable_days: forecast.len() - n,
            holiday_days: forecast
                .points()
                .iter()
                .filter(|p| p.holiday().is_holiday)
                .count(),
            avg_visitors: mean(|p| p.visitors),
            avg_vehicles: mean(|p| p.vehicles),
            avg_traffic_flow: mean(|p| p.traffic_flow),
            total_traffic_flow: available.iter().map(|(_, p)| p.traffic_flow).sum(),
            peak_traffic: peak,
            lowest_traffic: lowest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holidays::HolidayKind;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn predicted(date: NaiveDate, traffic_flow: f64) -> ForecastPoint {
        ForecastPoint::predicted(
            date,
            HolidayInfo::none(),
            Prediction {
                visitors: traffic_flow / 2.0,
                vehicles: traffic_flow / 4.0,
                traffic_flow,
                weather: None,
            },
        )
    }

    #[test]
    fn test_rejects_gaps_and_bad_lengths() {
        let now = Utc::now();
        let start = ymd(2025, 12, 1);
        let gap = vec![predicted(start, 1.0), predicted(ymd(2025, 12, 3), 1.0)];
        match Forecast::new(start, now, RunMode::Strict, gap) {
            Err(ForecastError::NonConsecutivePoints { expected, found }) => {
                assert_eq!(expected, ymd(2025, 12, 2));
                assert_eq!(found, ymd(2025, 12, 3));
            }
            other => panic!("expected NonConsecutivePoints, got {other:?}"),
        }

        let wrong_start = vec![predicted(ymd(2025, 12, 2), 1.0)];
        assert!(matches!(
            Forecast::new(start, now, RunMode::Strict, wrong_start),
            Err(ForecastError::NonConsecutivePoints { expected, .. }) if expected == start
        ));

        assert!(matches!(
            Forecast::new(start, now, RunMode::Strict, Vec::new()),
            Err(ForecastError::InvalidHorizon { requested: 0, .. })
        ));

        let eight: Vec<_> = start
            .iter_days()
            .take(8)
            .map(|d| predicted(d, 1.0))
            .collect();
        assert!(Forecast::new(start, now, RunMode::Strict, eight).is_err());
    }

    #[test]
    fn test_summary() {
        let start = ymd(2025, 12, 22);
        let points = vec![
            predicted(start, 1000.0),
            predicted(ymd(2025, 12, 23), 3000.0),
            ForecastPoint::unavailable(
                ymd(2025, 12, 24),
                HolidayInfo::new("Christmas Eve", HolidayKind::Special),
                "no weather data",
            ),
            predicted(ymd(2025, 12, 25), 3000.0),
        ];
        let forecast = Forecast::new(start, Utc::now(), RunMode::BestEffort, points).unwrap();
        let summary = forecast.summary();

        assert_eq!(summary.days, 4);
        assert_eq!(summary.available_days, 3);
        assert_eq!(summary.unavailable_days, 1);
        assert_eq!(summary.holiday_days, 1);
        assert_eq!(summary.avg_traffic_flow, Some(7000.0 / 3.0));
        assert_eq!(summary.avg_visitors, Some(3500.0 / 3.0));
        assert_eq!(summary.total_traffic_flow, 7000.0);
        assert_eq!(
            summary.peak_traffic,
            Some(DayValue {
                date: ymd(2025, 12, 23),
                value: 3000.0
            })
        );
        assert_eq!(summary.lowest_traffic.map(|d| d.date), Some(start));
        assert_eq!(forecast.end_date(), ymd(2025, 12, 25));
    }

    #[test]
    fn test_summary_all_unavailable() {
        let start = ymd(2025, 12, 1);
        let forecast = Forecast::new(
            start,
            Utc::now(),
            RunMode::BestEffort,
            vec![ForecastPoint::unavailable(start, HolidayInfo::none(), "x")],
        )
        .unwrap();
        let summary = forecast.summary();
        assert_eq!(summary.avg_traffic_flow, None);
        assert_eq!(summary.peak_traffic, None);
    }

    #[test]
    fn test_point_serializes_with_status() {
        let json = serde_json::to_value(predicted(ymd(2025, 12, 1), 40.0)).unwrap();
        assert_eq!(json["status"], "predicted");
        assert_eq!(json["traffic_flow"], 40.0);
        assert_eq!(json["holiday"]["is_holiday"], false);
    }
}
