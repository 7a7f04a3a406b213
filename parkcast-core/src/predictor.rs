//! Stage 1 (visitors, vehicles) and Stage 2 (traffic flow) predictors.
//!
//! Both stages check the incoming row against the model schema before
//! evaluating, and clip outputs to finite values `>= 0` since counts cannot be
//! negative or unbounded.

use crate::error::ForecastError;
use crate::features::{FeatureKey, FeatureRow, resolve_keys};
use chrono::NaiveDate;
use parkcast_ml::{FeatureSchema, RegressionModel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Clamp a raw model output to a valid count. NaN, infinities and negatives become 0.
pub fn clip_count(raw: f64) -> f64 {
    if raw.is_finite() && raw > 0.0 { raw } else { 0.0 }
}

fn check_schema(model: &RegressionModel, actual: &FeatureSchema) -> Result<(), ForecastError> {
    model
        .schema()
        .ensure_matches(actual)
        .map_err(|e| ForecastError::schema_mismatch(model.id(), e.to_string()))
}

fn evaluate(model: &RegressionModel, date: NaiveDate, values: &[f64]) -> Result<f64, ForecastError> {
    let raw = model.predict(values).map_err(|source| ForecastError::Evaluation {
        model: model.id(),
        source,
    })?;
    let clipped = clip_count(raw);
    if !raw.is_finite() {
        warn!(model = %model.id(), %date, raw, "Model output is not finite, clipped to zero");
    } else if clipped != raw {
        debug!(model = %model.id(), %date, raw, "Clipped model output to zero");
    }
    Ok(clipped)
}

/// What a Stage 1 model predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage1Target {
    Visitors,
    Vehicles,
}

/// Predicts one daily count from a [`FeatureRow`].
#[derive(Debug, Clone)]
pub struct Stage1Predictor {
    target: Stage1Target,
    model: Arc<RegressionModel>,
}

impl Stage1Predictor {
    pub fn visitors(model: Arc<RegressionModel>) -> Self {
        Self {
            target: Stage1Target::Visitors,
            model,
        }
    }

    pub fn vehicles(model: Arc<RegressionModel>) -> Self {
        Self {
            target: Stage1Target::Vehicles,
            model,
        }
    }

    pub fn target(&self) -> Stage1Target {
        self.target
    }

    pub fn model(&self) -> &RegressionModel {
        &self.model
    }

    pub fn predict(&self, row: &FeatureRow) -> Result<f64, ForecastError> {
        check_schema(&self.model, row.schema())?;
        evaluate(&self.model, row.date(), row.values())
    }
}

/// Both Stage 1 predictions for one day. Values are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stage1Output {
    visitors: f64,
    vehicles: f64,
}

impl Stage1Output {
    pub fn new(visitors: f64, vehicles: f64) -> Self {
        Self {
            visitors: clip_count(visitors),
            vehicles: clip_count(vehicles),
        }
    }

    pub fn visitors(&self) -> f64 {
        self.visitors
    }

    pub fn vehicles(&self) -> f64 {
        self.vehicles
    }
}

/// Stage 2 input: a feature row plus Stage 1 outputs, laid out in the Stage 2 schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedFeatureRow {
    date: NaiveDate,
    schema: Arc<FeatureSchema>,
    values: Vec<f64>,
    stage1: Stage1Output,
}

impl AugmentedFeatureRow {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn stage1(&self) -> Stage1Output {
        self.stage1
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema.position(name).map(|i| self.values[i])
    }
}

/// Predicts traffic flow from features plus Stage 1 outputs.
#[derive(Debug, Clone)]
pub struct Stage2Predictor {
    model: Arc<RegressionModel>,
    schema: Arc<FeatureSchema>,
    keys: Vec<FeatureKey>,
}

impl Stage2Predictor {
    /// Fails with `SchemaMismatch` unless the schema names each Stage 1
    /// output exactly once and every other field is a known feature.
    pub fn new(model: Arc<RegressionModel>) -> Result<Self, ForecastError> {
        let keys = resolve_keys(model.schema(), &model.id())?;
        for output in [FeatureKey::PredictedVisitors, FeatureKey::PredictedVehicles] {
            let count = keys.iter().filter(|k| **k == output).count();
            if count != 1 {
                return Err(ForecastError::schema_mismatch(
                    model.id(),
                    format!("expected exactly one '{output}' field, found {count}"),
                ));
            }
        }
        let schema = Arc::new(model.schema().clone());
        Ok(Self {
            model,
            schema,
            keys,
        })
    }

    pub fn model(&self) -> &RegressionModel {
        &self.model
    }

    /// Check that rows built for `row_schema` can feed this model.
    pub fn check_inputs(&self, row_schema: &FeatureSchema) -> Result<(), ForecastError> {
        let available = resolve_keys(row_schema, "feature builder")?;
        let missing: Vec<&str> = self
            .schema
            .names()
            .zip(&self.keys)
            .filter(|(_, k)| !k.is_stage1_output() && !available.contains(k))
            .map(|(name, _)| name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ForecastError::schema_mismatch(
                self.model.id(),
                format!(
                    "Stage 1 features do not supply [{}]",
                    missing.join(", ")
                ),
            ))
        }
    }

    /// Project `row` and the Stage 1 outputs onto the Stage 2 schema.
    pub fn augment(
        &self,
        row: &FeatureRow,
        stage1: Stage1Output,
    ) -> Result<AugmentedFeatureRow, ForecastError> {
        let values = self
            .schema
            .names()
            .zip(&self.keys)
            .map(|(name, &key)| match key {
                FeatureKey::PredictedVisitors => Ok(stage1.visitors()),
                FeatureKey::PredictedVehicles => Ok(stage1.vehicles()),
                _ => row.value_of(key).ok_or_else(|| {
                    ForecastError::schema_mismatch(
                        self.model.id(),
                        format!("feature row for {} has no '{name}'", row.date()),
                    )
                }),
            })
            .collect::<Result<Vec<f64>, ForecastError>>()?;
        Ok(AugmentedFeatureRow {
            date: row.date(),
            schema: Arc::clone(&self.schema),
            values,
            stage1,
        })
    }

    pub fn predict(&self, row: &AugmentedFeatureRow) -> Result<f64, ForecastError> {
        check_schema(&self.model, row.schema())?;
        evaluate(&self.model, row.date(), row.values())
    }
}
