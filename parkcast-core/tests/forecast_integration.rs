//! Integration tests for the forecast pipeline.
//!
//! These tests run the full two-stage chain over small hand-built tree
//! ensembles, covering ordering, failure handling and determinism.

use chrono::{Duration, NaiveDate};
use parkcast_core::{
    DailyWeather, ForecastError, Forecaster, HolidayCalendar, HolidayLookup, Pipeline,
    PointOutcome, RunMode, STAGE1_FEATURES, STAGE2_FEATURES, WeatherTable,
};
use parkcast_ml::{
    FeatureSchema, LocalModelStore, ModelStore, ModelVersion, Objective, RegressionModel, Tree,
    TreeEnsemble,
};
use pretty_assertions::{assert_eq, assert_ne};
use std::sync::Arc;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn model(name: &str, version: u32, names: &[&str], trees: Vec<Tree>) -> RegressionModel {
    let schema = FeatureSchema::from_names(names.iter().copied()).unwrap();
    let ensemble = TreeEnsemble::new(names.len(), Objective::SquaredError, 0.0, trees).unwrap();
    RegressionModel::new(name, version, schema, ensemble).unwrap()
}

/// Visitors: 1500 on ordinary days, 3000 on holidays; -200 below 10°C, +300 above.
fn visitors_model() -> RegressionModel {
    model(
        "visitors",
        4,
        &STAGE1_FEATURES,
        vec![
            Tree::stump(0, 0.5, 1500.0, 3000.0),
            Tree::stump(1, 10.0, -200.0, 300.0),
        ],
    )
}

/// Vehicles: 400 on ordinary days, 900 on holidays.
fn vehicles_model() -> RegressionModel {
    model(
        "vehicles",
        4,
        &STAGE1_FEATURES,
        vec![Tree::stump(0, 0.5, 400.0, 900.0)],
    )
}

/// Traffic: 5000 or 9000 depending on visitors, plus 1000 for heavy vehicle days.
fn traffic_model() -> RegressionModel {
    model(
        "traffic",
        7,
        &STAGE2_FEATURES,
        vec![
            Tree::stump(0, 2000.0, 5000.0, 9000.0),
            Tree::stump(2, 600.0, 0.0, 1000.0),
        ],
    )
}

fn pipeline() -> Pipeline {
    Pipeline::new(
        Arc::new(visitors_model()),
        Arc::new(vehicles_model()),
        Arc::new(traffic_model()),
    )
    .unwrap()
}

fn weather(temp_mean: f64) -> DailyWeather {
    DailyWeather {
        temp_min: temp_mean - 4.0,
        temp_max: temp_mean + 4.0,
        temp_mean,
        precipitation_sum: 0.0,
        wind_speed_mean: 12.0,
        wind_speed_max: 25.0,
        wind_direction_dominant: 270.0,
    }
}

fn week_of_weather(start: NaiveDate, skip: Option<usize>) -> WeatherTable {
    (0..7)
        .filter(|i| Some(*i) != skip)
        .map(|i| (start + Duration::days(i as i64), weather(4.0 + i as f64 * 2.0)))
        .collect()
}

fn forecaster(table: WeatherTable) -> Forecaster<WeatherTable, HolidayCalendar> {
    Forecaster::new(pipeline(), table, HolidayCalendar::new())
}

#[test]
fn test_seven_ordered_consecutive_points() {
    let start = ymd(2025, 11, 24);
    let forecast = forecaster(week_of_weather(start, None))
        .forecast(start, 7, RunMode::Strict)
        .unwrap();

    assert_eq!(forecast.len(), 7);
    assert_eq!(forecast.start_date(), start);
    assert_eq!(forecast.end_date(), ymd(2025, 11, 30));
    for (i, point) in forecast.points().iter().enumerate() {
        assert_eq!(point.date(), start + Duration::days(i as i64));
        let p = point.prediction().unwrap();
        assert!(p.visitors >= 0.0 && p.vehicles >= 0.0 && p.traffic_flow >= 0.0);
    }
}

#[test]
fn test_schema_consistency_between_stages() {
    let pipeline = pipeline();
    let date = ymd(2025, 11, 26);
    let table = week_of_weather(ymd(2025, 11, 24), None);
    let row = pipeline
        .builder()
        .build(date, &table, &HolidayCalendar::new())
        .unwrap();
    assert!(row.schema().matches(pipeline.visitors().model().schema()));
    assert!(row.schema().matches(pipeline.vehicles().model().schema()));

    let stage1 = parkcast_core::Stage1Output::new(
        pipeline.visitors().predict(&row).unwrap(),
        pipeline.vehicles().predict(&row).unwrap(),
    );
    let augmented = pipeline.traffic().augment(&row, stage1).unwrap();
    assert!(
        augmented
            .schema()
            .matches(pipeline.traffic().model().schema())
    );
    assert_eq!(augmented.get("visitors"), Some(stage1.visitors()));
    assert_eq!(augmented.get("vehicles"), Some(stage1.vehicles()));
}

#[test]
fn test_stage1_models_must_share_schema() {
    let reordered = model(
        "vehicles",
        4,
        &[
            "temperature_2m_mean",
            "holidays",
            "precipitation_sum",
            "wind_speed_10m_max",
            "wind_direction_10m_dominant",
        ],
        vec![Tree::leaf(1.0)],
    );
    let err = Pipeline::new(
        Arc::new(visitors_model()),
        Arc::new(reordered),
        Arc::new(traffic_model()),
    )
    .unwrap_err();
    match err {
        ForecastError::SchemaMismatch { model, detail } => {
            assert_eq!(model, "vehicles@v4");
            assert!(detail.contains("different order"), "{detail}");
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn test_stage2_needing_unbuilt_feature_is_rejected() {
    let traffic = model(
        "traffic",
        7,
        &["visitors", "vehicles", "temperature_2m_max"],
        vec![Tree::leaf(1.0)],
    );
    let err = Pipeline::new(
        Arc::new(visitors_model()),
        Arc::new(vehicles_model()),
        Arc::new(traffic),
    )
    .unwrap_err();
    assert!(err.to_string().contains("temperature_2m_max"));
}

#[test]
fn test_adversarial_stage1_output_is_clipped() {
    let negative = model(
        "visitors",
        4,
        &STAGE1_FEATURES,
        vec![Tree::leaf(-1.0e6)],
    );
    let pipeline = Pipeline::new(
        Arc::new(negative),
        Arc::new(vehicles_model()),
        Arc::new(traffic_model()),
    )
    .unwrap();
    let start = ymd(2025, 11, 24);
    let forecast = Forecaster::new(pipeline, week_of_weather(start, None), HolidayCalendar::new())
        .forecast(start, 3, RunMode::Strict)
        .unwrap();
    for point in forecast.points() {
        let p = point.prediction().unwrap();
        assert_eq!(p.visitors, 0.0);
        assert!(p.traffic_flow >= 5000.0);
    }
}

#[test]
fn test_overflowing_stage1_output_is_clipped() {
    // exp(1000) overflows to +inf under the log link
    let schema = FeatureSchema::from_names(STAGE1_FEATURES).unwrap();
    let ensemble = TreeEnsemble::new(
        STAGE1_FEATURES.len(),
        Objective::Poisson,
        1.0,
        vec![Tree::leaf(1000.0)],
    )
    .unwrap();
    let overflowing = RegressionModel::new("visitors", 4, schema, ensemble).unwrap();
    let pipeline = Pipeline::new(
        Arc::new(overflowing),
        Arc::new(vehicles_model()),
        Arc::new(traffic_model()),
    )
    .unwrap();
    let start = ymd(2025, 11, 24);
    let forecast = Forecaster::new(pipeline, week_of_weather(start, None), HolidayCalendar::new())
        .forecast(start, 3, RunMode::Strict)
        .unwrap();
    for point in forecast.points() {
        let p = point.prediction().unwrap();
        assert_eq!(p.visitors, 0.0);
        assert!(p.traffic_flow.is_finite());
    }
    assert_eq!(forecast.summary().avg_visitors, Some(0.0));
}

#[test]
fn test_single_day_runs_match_the_week() {
    let start = ymd(2025, 12, 20);
    let forecaster = forecaster(week_of_weather(start, None));
    let week = forecaster.forecast(start, 7, RunMode::Strict).unwrap();

    for point in week.points() {
        let single = forecaster
            .forecast(point.date(), 1, RunMode::Strict)
            .unwrap();
        assert_eq!(single.points()[0].outcome(), point.outcome());
        assert_eq!(single.points()[0].holiday(), point.holiday());
    }
}

#[test]
fn test_changing_one_days_weather_changes_only_that_point() {
    let start = ymd(2025, 11, 24);
    let baseline = forecaster(week_of_weather(start, None))
        .forecast(start, 7, RunMode::Strict)
        .unwrap();

    for i in 0..7 {
        let target = start + Duration::days(i as i64);
        let mut table = week_of_weather(start, None);
        // Flip the temperature stump: warm days get cold and cold days get warm
        let original = table.remove(target).unwrap();
        let flipped = if original.temp_mean < 10.0 { 30.0 } else { -10.0 };
        table.insert(target, weather(flipped));

        let mutated = forecaster(table)
            .forecast(start, 7, RunMode::Strict)
            .unwrap();
        for (j, (before, after)) in baseline
            .points()
            .iter()
            .zip(mutated.points())
            .enumerate()
        {
            if j == i {
                assert_ne!(before.outcome(), after.outcome(), "day {i} should change");
            } else {
                assert_eq!(
                    before.outcome(),
                    after.outcome(),
                    "day {j} changed when only day {i} was edited"
                );
            }
        }
    }
}

#[test]
fn test_day_five_failure_strict_aborts() {
    let start = ymd(2025, 11, 24);
    let err = forecaster(week_of_weather(start, Some(4)))
        .forecast(start, 7, RunMode::Strict)
        .unwrap_err();
    match err {
        ForecastError::FeatureUnavailable { date, .. } => assert_eq!(date, ymd(2025, 11, 28)),
        other => panic!("expected FeatureUnavailable, got {other:?}"),
    }
}

#[test]
fn test_day_five_failure_best_effort_marks_day() {
    let start = ymd(2025, 11, 24);
    let forecast = forecaster(week_of_weather(start, Some(4)))
        .forecast(start, 7, RunMode::BestEffort)
        .unwrap();

    assert_eq!(forecast.len(), 7);
    assert_eq!(forecast.mode(), RunMode::BestEffort);
    for (i, point) in forecast.points().iter().enumerate() {
        if i == 4 {
            assert!(matches!(point.outcome(), PointOutcome::Unavailable { .. }));
            assert_eq!(point.holiday().name.as_deref(), Some("Black Friday"));
        } else {
            assert!(point.is_available(), "day {i} should be predicted");
        }
    }
    let summary = forecast.summary();
    assert_eq!(summary.available_days, 6);
    assert_eq!(summary.unavailable_days, 1);
}

#[test]
fn test_stage1_schema_mismatch_is_fatal() {
    let vehicles = model("vehicles", 4, &["holidays"], vec![Tree::leaf(1.0)]);
    let err = Pipeline::new(
        Arc::new(visitors_model()),
        Arc::new(vehicles),
        Arc::new(traffic_model()),
    )
    .unwrap_err();
    assert!(!err.is_recoverable());
}

#[test]
fn test_holiday_scenario_is_deterministic() {
    let christmas = ymd(2025, 12, 25);
    let table: WeatherTable = [(christmas, weather(5.0))].into_iter().collect();
    let forecaster = forecaster(table);

    let first = forecaster.forecast(christmas, 1, RunMode::Strict).unwrap();
    let p = first.points()[0].prediction().unwrap().clone();
    // holiday: 3000 - 200 visitors, 900 vehicles -> 9000 + 1000 traffic
    assert_eq!(p.visitors, 2800.0);
    assert_eq!(p.vehicles, 900.0);
    assert_eq!(p.traffic_flow, 10000.0);
    assert_eq!(first.points()[0].holiday().name.as_deref(), Some("Christmas Day"));

    for _ in 0..5 {
        let again = forecaster.forecast(christmas, 1, RunMode::Strict).unwrap();
        let q = again.points()[0].prediction().unwrap();
        assert_eq!(q.visitors.to_bits(), p.visitors.to_bits());
        assert_eq!(q.vehicles.to_bits(), p.vehicles.to_bits());
        assert_eq!(q.traffic_flow.to_bits(), p.traffic_flow.to_bits());
    }
}

#[test]
fn test_holiday_lookup_is_pure_across_runs() {
    let calendar = HolidayCalendar::new().with_custom(ymd(2025, 8, 2), "Caribbean Carnival");
    for date in ymd(2025, 1, 1).iter_days().take(365) {
        assert_eq!(calendar.lookup(date), calendar.lookup(date));
    }
}

#[test]
fn test_invalid_horizon() {
    let start = ymd(2025, 11, 24);
    let forecaster = forecaster(week_of_weather(start, None));
    for horizon in [0, 8, 30] {
        assert!(matches!(
            forecaster.forecast(start, horizon, RunMode::Strict),
            Err(ForecastError::InvalidHorizon { max: 7, .. })
        ));
    }
}

#[test]
fn test_pipeline_from_model_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalModelStore::new(dir.path());
    store.save(&visitors_model()).unwrap();
    store.save(&vehicles_model()).unwrap();
    store.save(&traffic_model()).unwrap();

    let load = |name: &str| Arc::new(store.load(name, ModelVersion::Latest).unwrap());
    let pipeline = Pipeline::new(load("visitors"), load("vehicles"), load("traffic")).unwrap();

    let start = ymd(2025, 11, 24);
    let forecast = Forecaster::new(pipeline, week_of_weather(start, None), HolidayCalendar::new())
        .forecast(start, 7, RunMode::Strict)
        .unwrap();
    let expected = forecaster(week_of_weather(start, None))
        .forecast(start, 7, RunMode::Strict)
        .unwrap();
    assert_eq!(forecast.points(), expected.points());
}
