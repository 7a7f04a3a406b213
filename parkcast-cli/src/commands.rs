//! CLI subcommand handlers.

use crate::render::Dashboard;
use crate::sink;
use crate::{Commands, ConfigAction, RunArgs};
use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate};
use parkcast_core::config::{ModelRef, ParkcastConfig, load_config};
use parkcast_core::{
    Forecast, ForecastError, Forecaster, OpenMeteoClient, Pipeline, RunMode,
    WeatherTable,
};
use parkcast_ml::{LocalModelStore, ModelStore, RegressionModel};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_file),
        Commands::Run(args) => {
            handle_run(args, load(workspace, config_file)?, workspace, quiet).await
        }
        Commands::Schema => handle_schema(&load(workspace, config_file)?, workspace),
        Commands::Holidays { year } => handle_holidays(&load(workspace, config_file)?, year),
    }
}

fn load(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<ParkcastConfig> {
    load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".parkcast");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = ParkcastConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_file)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

fn load_model(store: &LocalModelStore, model: &ModelRef) -> Result<Arc<RegressionModel>, ForecastError> {
    store
        .load(&model.name, model.version)
        .map(Arc::new)
        .map_err(|source| ForecastError::ModelLoadFailure {
            name: model.name.clone(),
            version: model.version.to_string(),
            source,
        })
}

fn load_pipeline(config: &ParkcastConfig, workspace: &Path) -> Result<Pipeline, ForecastError> {
    let store = LocalModelStore::new(resolve(workspace, &config.models.store_dir));
    let visitors = load_model(&store, &config.models.visitors)?;
    let vehicles = load_model(&store, &config.models.vehicles)?;
    let traffic = load_model(&store, &config.models.traffic)?;
    Pipeline::new(visitors, vehicles, traffic)
}

async fn handle_run(
    args: RunArgs,
    mut config: ParkcastConfig,
    workspace: &Path,
    quiet: bool,
) -> anyhow::Result<()> {
    // Apply CLI overrides
    if let Some(horizon) = args.horizon {
        config.forecast.horizon_days = horizon;
    }
    if args.best_effort {
        config.forecast.mode = RunMode::BestEffort;
    }
    if let Some(output) = args.output {
        config.output.dir = output;
    }
    if args.no_html {
        config.output.write_html = false;
    }
    config.validate()?;

    let run_date = config.location.today()?;
    let start = args
        .start
        .unwrap_or_else(|| config.forecast.start.start_date(run_date));
    let horizon = config.forecast.horizon_days;
    let mode = config.forecast.mode;
    info!(%start, horizon, ?mode, location = %config.location.name, "Preparing forecast");

    let pipeline = load_pipeline(&config, workspace)?;

    let weather = if pipeline.builder().needs_weather() {
        let end = start + Duration::days(horizon as i64 - 1);
        let client = OpenMeteoClient::new(&config.location, &config.weather)?;
        match client.fetch(start, end).await {
            Ok(table) => table,
            Err(e) if mode == RunMode::BestEffort => {
                warn!(error = %e, "Weather fetch failed; every day will be unavailable");
                WeatherTable::new()
            }
            Err(e) => return Err(e).context("Weather forecast could not be fetched"),
        }
    } else {
        WeatherTable::new()
    };

    let forecaster = Forecaster::new(pipeline, weather, config.holidays.calendar());
    let forecast = forecaster
        .forecast(start, horizon, mode)
        .context("Forecast run failed; no outputs were published")?;

    if !quiet {
        print_forecast(&forecast);
    }
    publish(&forecast, &config, workspace, run_date)?;
    Ok(())
}

fn publish(
    forecast: &Forecast,
    config: &ParkcastConfig,
    workspace: &Path,
    run_date: NaiveDate,
) -> anyhow::Result<()> {
    let out_dir = resolve(workspace, &config.output.dir);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    if config.output.write_csv {
        let path = sink::write_csv(&out_dir, run_date, forecast)?;
        println!("Predictions saved: {}", path.display());
    }
    if config.output.write_json {
        let path = sink::write_json(&out_dir, run_date, &config.location, forecast)?;
        println!("Predictions saved: {}", path.display());
    }
    if config.output.write_html {
        let tz = config.location.tz()?;
        let html = Dashboard::new()?.render(&config.location.name, tz, forecast)?;
        let path = out_dir.join(&config.output.html_file);
        sink::write_atomic(&path, html.as_bytes())?;
        println!("Dashboard saved: {}", path.display());
    }
    Ok(())
}

fn print_forecast(forecast: &Forecast) {
    println!(
        "\n  {:<12} {:<26} {:>10} {:>10} {:>12} {:>8}",
        "Date", "Holiday", "Visitors", "Vehicles", "Traffic", "Temp"
    );
    for point in forecast.points() {
        let holiday = point.holiday().name.as_deref().unwrap_or("");
        match point.prediction() {
            Some(p) => println!(
                "  {:<12} {:<26} {:>10.0} {:>10.0} {:>12.0} {:>8}",
                point.date().to_string(),
                holiday,
                p.visitors,
                p.vehicles,
                p.traffic_flow,
                p.weather
                    .map(|w| format!("{:.1}°C", w.temp_mean))
                    .unwrap_or_default()
            ),
            None => println!(
                "  {:<12} {:<26} {:>10} {:>10} {:>12} {:>8}",
                point.date().to_string(),
                holiday,
                "n/a",
                "n/a",
                "n/a",
                ""
            ),
        }
    }
    let summary = forecast.summary();
    if let Some(avg) = summary.avg_traffic_flow {
        println!("\n  Average traffic flow: {avg:.0}/day");
    }
    if summary.unavailable_days > 0 {
        println!("  Unavailable days: {}", summary.unavailable_days);
    }
    println!();
}

fn handle_schema(config: &ParkcastConfig, workspace: &Path) -> anyhow::Result<()> {
    let store = LocalModelStore::new(resolve(workspace, &config.models.store_dir));
    let refs = [
        ("Stage 1 visitors", &config.models.visitors),
        ("Stage 1 vehicles", &config.models.vehicles),
        ("Stage 2 traffic", &config.models.traffic),
    ];
    let mut models = Vec::with_capacity(refs.len());
    for (label, model_ref) in refs {
        let model = load_model(&store, model_ref)?;
        let fingerprint = model.schema().fingerprint();
        println!("{label}: {}", model.id());
        println!("  schema:      {}", model.schema());
        println!("  fingerprint: {}", &fingerprint[..16]);
        println!(
            "  trees:       {} ({:?})",
            model.ensemble().num_trees(),
            model.ensemble().objective()
        );
        models.push(model);
    }

    let [visitors, vehicles, traffic]: [Arc<RegressionModel>; 3] = models
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected three models"))?;
    let pipeline = Pipeline::new(visitors, vehicles, traffic)?;
    let keys: Vec<String> = pipeline
        .builder()
        .keys()
        .iter()
        .map(|k| k.to_string())
        .collect();
    println!("\nFeature builder serves: {}", keys.join(", "));
    println!("All schemas are consistent.");
    Ok(())
}

fn handle_holidays(config: &ParkcastConfig, year: Option<i32>) -> anyhow::Result<()> {
    let year = match year {
        Some(year) => year,
        None => config.location.today()?.year(),
    };
    let calendar = config.holidays.calendar();
    println!("Holidays in {year}:");
    for (date, info) in calendar.holidays_in_year(year) {
        println!(
            "  {}  {:<3}  {:<30} {:?}",
            date,
            date.format("%a").to_string(),
            info.name.as_deref().unwrap_or(""),
            info.kind
        );
    }
    if config.holidays.weekends_as_holidays {
        println!("  Saturdays and Sundays are also flagged as holidays.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkcast_core::STAGE1_FEATURES;
    use parkcast_ml::{FeatureSchema, MlError, ModelVersion, Objective, Tree, TreeEnsemble};

    fn config_for(out: &Path) -> ParkcastConfig {
        let mut config = ParkcastConfig::default();
        config.output.dir = out.to_path_buf();
        config
    }

    fn run_args() -> RunArgs {
        RunArgs {
            start: NaiveDate::from_ymd_opt(2025, 11, 24),
            ..RunArgs::default()
        }
    }

    fn model_load_failure(err: &anyhow::Error) -> Option<(&str, &str)> {
        err.chain()
            .find_map(|cause| match cause.downcast_ref::<ForecastError>() {
                Some(ForecastError::ModelLoadFailure { name, version, .. }) => {
                    Some((name.as_str(), version.as_str()))
                }
                _ => None,
            })
    }

    fn is_empty_or_missing(dir: &Path) -> bool {
        match std::fs::read_dir(dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_run_with_empty_model_store_publishes_nothing() {
        let workspace = tempfile::tempdir().unwrap();
        let out = workspace.path().join("out");
        let config = config_for(&out);
        let visitors = config.models.visitors.clone();

        let err = handle_run(run_args(), config, workspace.path(), true)
            .await
            .unwrap_err();

        let (name, version) = model_load_failure(&err)
            .unwrap_or_else(|| panic!("expected ModelLoadFailure in chain, got {err:#}"));
        assert_eq!(name, visitors.name);
        assert_eq!(version, visitors.version.to_string());
        assert!(is_empty_or_missing(&out));
    }

    #[tokio::test]
    async fn test_run_with_partial_model_store_publishes_nothing() {
        let workspace = tempfile::tempdir().unwrap();
        let out = workspace.path().join("out");
        let config = config_for(&out);

        // Only the visitors model is present
        let store = LocalModelStore::new(resolve(workspace.path(), &config.models.store_dir));
        let schema = FeatureSchema::from_names(STAGE1_FEATURES).unwrap();
        let ensemble = TreeEnsemble::new(
            STAGE1_FEATURES.len(),
            Objective::SquaredError,
            0.0,
            vec![Tree::leaf(1500.0)],
        )
        .unwrap();
        let ModelVersion::Exact(version) = config.models.visitors.version else {
            panic!("default visitors model should pin a version");
        };
        let visitors = RegressionModel::new(
            config.models.visitors.name.clone(),
            version,
            schema,
            ensemble,
        )
        .unwrap();
        store.save(&visitors).unwrap();
        let vehicles = config.models.vehicles.clone();

        let err = handle_run(run_args(), config, workspace.path(), true)
            .await
            .unwrap_err();

        let (name, _) = model_load_failure(&err)
            .unwrap_or_else(|| panic!("expected ModelLoadFailure in chain, got {err:#}"));
        assert_eq!(name, vehicles.name);
        assert!(is_empty_or_missing(&out));
    }

    #[tokio::test]
    async fn test_run_with_invalid_horizon_publishes_nothing() {
        let workspace = tempfile::tempdir().unwrap();
        let out = workspace.path().join("out");
        let args = RunArgs {
            horizon: Some(8),
            ..run_args()
        };

        let err = handle_run(args, config_for(&out), workspace.path(), true)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ForecastError>(),
            Some(ForecastError::InvalidHorizon { requested: 8, .. })
        ));
        assert!(is_empty_or_missing(&out));
    }

    #[test]
    fn test_load_model_maps_store_errors() {
        let workspace = tempfile::tempdir().unwrap();
        let store = LocalModelStore::new(workspace.path());
        let config = ParkcastConfig::default();

        let err = load_model(&store, &config.models.traffic).unwrap_err();
        match err {
            ForecastError::ModelLoadFailure {
                name,
                version,
                source,
            } => {
                assert_eq!(name, config.models.traffic.name);
                assert_eq!(version, config.models.traffic.version.to_string());
                assert!(matches!(source, MlError::NotFound(_)), "{source:?}");
            }
            other => panic!("expected ModelLoadFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let workspace = Path::new("/srv/parkcast");
        assert_eq!(
            resolve(workspace, Path::new("out")),
            PathBuf::from("/srv/parkcast/out")
        );
        assert_eq!(
            resolve(workspace, Path::new("/tmp/out")),
            PathBuf::from("/tmp/out")
        );
    }
}
