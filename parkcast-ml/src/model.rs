//! Trained regressors bound to a feature schema and a version.

use crate::ensemble::TreeEnsemble;
use crate::error::MlError;
use crate::schema::FeatureSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag written into native model documents.
pub const NATIVE_FORMAT: &str = "parkcast-gbdt";

/// A trained regressor. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionModel {
    name: String,
    version: u32,
    schema: FeatureSchema,
    ensemble: TreeEnsemble,
    trained_at: Option<DateTime<Utc>>,
}

impl RegressionModel {
    pub fn new(
        name: impl Into<String>,
        version: u32,
        schema: FeatureSchema,
        ensemble: TreeEnsemble,
    ) -> Result<Self, MlError> {
        if schema.len() != ensemble.num_features() {
            return Err(MlError::schema_mismatch(format!(
                "schema declares {} fields but the ensemble expects {}",
                schema.len(),
                ensemble.num_features()
            )));
        }
        Ok(Self {
            name: name.into(),
            version,
            schema,
            ensemble,
            trained_at: None,
        })
    }

    pub fn with_trained_at(mut self, trained_at: DateTime<Utc>) -> Self {
        self.trained_at = Some(trained_at);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn ensemble(&self) -> &TreeEnsemble {
        &self.ensemble
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    /// `name@vversion`, used in logs and error messages.
    pub fn id(&self) -> String {
        format!("{}@v{}", self.name, self.version)
    }

    /// Raw prediction for values laid out in schema order.
    pub fn predict(&self, values: &[f64]) -> Result<f64, MlError> {
        self.ensemble.predict(values)
    }

    pub(crate) fn to_document(&self) -> ModelDocument {
        ModelDocument {
            format: NATIVE_FORMAT.to_string(),
            name: self.name.clone(),
            version: self.version,
            schema: self.schema.clone(),
            ensemble: self.ensemble.clone(),
            trained_at: self.trained_at,
        }
    }

    pub(crate) fn from_document(doc: ModelDocument) -> Result<Self, MlError> {
        if doc.format != NATIVE_FORMAT {
            return Err(MlError::model(format!(
                "unknown model format '{}'",
                doc.format
            )));
        }
        let model = Self::new(doc.name, doc.version, doc.schema, doc.ensemble)?;
        Ok(match doc.trained_at {
            Some(ts) => model.with_trained_at(ts),
            None => model,
        })
    }
}

/// On-disk representation of a native model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModelDocument {
    pub format: String,
    pub name: String,
    pub version: u32,
    pub schema: FeatureSchema,
    pub ensemble: TreeEnsemble,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
}
