//! The two-stage prediction chain for a single day.

use crate::error::ForecastError;
use crate::features::FeatureBuilder;
use crate::forecast::Prediction;
use crate::holidays::{HolidayInfo, HolidayLookup};
use crate::predictor::{Stage1Output, Stage1Predictor, Stage2Predictor};
use crate::weather::{WeatherLookup, WeatherSummary};
use chrono::NaiveDate;
use parkcast_ml::RegressionModel;
use std::sync::Arc;
use tracing::debug;

/// Feature builder plus the three models, validated against each other.
#[derive(Debug, Clone)]
pub struct Pipeline {
    builder: FeatureBuilder,
    visitors: Stage1Predictor,
    vehicles: Stage1Predictor,
    traffic: Stage2Predictor,
}

impl Pipeline {
    /// Wire up the models. All schema incompatibilities surface here as
    /// `SchemaMismatch`, before any day is predicted.
    pub fn new(
        visitors: Arc<RegressionModel>,
        vehicles: Arc<RegressionModel>,
        traffic: Arc<RegressionModel>,
    ) -> Result<Self, ForecastError> {
        if !visitors.schema().matches(vehicles.schema()) {
            return Err(ForecastError::schema_mismatch(
                vehicles.id(),
                format!(
                    "Stage 1 models disagree on features ({} vs {}): {}",
                    visitors.id(),
                    vehicles.id(),
                    visitors.schema().diff(vehicles.schema())
                ),
            ));
        }
        let builder = FeatureBuilder::new(visitors.schema().clone())?;
        let traffic = Stage2Predictor::new(traffic)?;
        traffic.check_inputs(builder.schema())?;

        debug!(
            visitors = %visitors.id(),
            vehicles = %vehicles.id(),
            traffic = %traffic.model().id(),
            "Pipeline ready"
        );
        Ok(Self {
            builder,
            visitors: Stage1Predictor::visitors(visitors),
            vehicles: Stage1Predictor::vehicles(vehicles),
            traffic,
        })
    }

    pub fn builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    pub fn visitors(&self) -> &Stage1Predictor {
        &self.visitors
    }

    pub fn vehicles(&self) -> &Stage1Predictor {
        &self.vehicles
    }

    pub fn traffic(&self) -> &Stage2Predictor {
        &self.traffic
    }

    /// Predict one day. Depends only on `date` and the two lookups.
    pub fn predict_day(
        &self,
        date: NaiveDate,
        weather: &dyn WeatherLookup,
        holidays: &dyn HolidayLookup,
    ) -> Result<(HolidayInfo, Prediction), ForecastError> {
        let row = self.builder.build(date, weather, holidays)?;

        let stage1 = Stage1Output::new(self.visitors.predict(&row)?, self.vehicles.predict(&row)?);
        debug!(
            %date,
            visitors = stage1.visitors(),
            vehicles = stage1.vehicles(),
            "Stage 1 complete"
        );

        let augmented = self.traffic.augment(&row, stage1)?;
        let traffic_flow = self.traffic.predict(&augmented)?;
        debug!(%date, traffic_flow, "Stage 2 complete");

        let prediction = Prediction {
            visitors: stage1.visitors(),
            vehicles: stage1.vehicles(),
            traffic_flow,
            weather: row.weather().map(WeatherSummary::from),
        };
        Ok((row.holiday().clone(), prediction))
    }
}
