//! Versioned model store backed by a directory tree.
//!
//! Layout: `<root>/<name>/<version>/model.json` with an optional
//! `metadata.json` next to it. `model.json` is either a native document or an
//! XGBoost JSON dump; for the latter, `metadata.json` may pin the expected
//! schema fingerprint.

use crate::error::MlError;
use crate::model::{ModelDocument, RegressionModel};
use crate::schema::FeatureSchema;
use crate::xgboost::{import_xgboost_json, is_xgboost_document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const MODEL_FILE: &str = "model.json";
const METADATA_FILE: &str = "metadata.json";

/// Which version of a model to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelVersion {
    #[default]
    Latest,
    Exact(u32),
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVersion::Latest => write!(f, "latest"),
            ModelVersion::Exact(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for ModelVersion {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(ModelVersion::Latest);
        }
        s.trim_start_matches('v')
            .parse::<u32>()
            .map(ModelVersion::Exact)
            .map_err(|_| MlError::invalid_input(format!("invalid model version '{s}'")))
    }
}

impl Serialize for ModelVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ModelVersion::Latest => serializer.serialize_str("latest"),
            ModelVersion::Exact(v) => serializer.serialize_u32(*v),
        }
    }
}

impl<'de> Deserialize<'de> for ModelVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(ModelVersion::Exact(v)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Sidecar metadata stored next to each model version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<FeatureSchema>,
    pub fingerprint: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Read/write access to trained models by name and version.
pub trait ModelStore {
    fn load(&self, name: &str, version: ModelVersion) -> Result<RegressionModel, MlError>;

    fn save(&self, model: &RegressionModel) -> Result<PathBuf, MlError>;

    /// Available versions of `name`, ascending.
    fn versions(&self, name: &str) -> Result<Vec<u32>, MlError>;
}

/// Filesystem model store.
pub struct LocalModelStore {
    root: PathBuf,
}

impl LocalModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_dir(&self, name: &str, version: u32) -> PathBuf {
        self.root.join(name).join(version.to_string())
    }

    fn resolve(&self, name: &str, version: ModelVersion) -> Result<u32, MlError> {
        match version {
            ModelVersion::Exact(v) => Ok(v),
            ModelVersion::Latest => self
                .versions(name)?
                .last()
                .copied()
                .ok_or_else(|| MlError::not_found(format!("no versions of model '{name}'"))),
        }
    }

    fn read_metadata(dir: &Path) -> Result<Option<ModelMetadata>, MlError> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

fn validate_name(name: &str) -> Result<(), MlError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && name != "."
        && name != "..";
    if ok {
        Ok(())
    } else {
        Err(MlError::invalid_input(format!("invalid model name '{name}'")))
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<(), MlError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl ModelStore for LocalModelStore {
    fn load(&self, name: &str, version: ModelVersion) -> Result<RegressionModel, MlError> {
        validate_name(name)?;
        let version = self.resolve(name, version)?;
        let dir = self.model_dir(name, version);
        let path = dir.join(MODEL_FILE);
        if !path.exists() {
            return Err(MlError::not_found(format!(
                "model '{name}' version {version} ({})",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let metadata = Self::read_metadata(&dir)?;

        let model = if is_xgboost_document(&value) {
            let imported = import_xgboost_json(&content)?;
            RegressionModel::new(name, version, imported.schema, imported.ensemble)?
        } else {
            let doc: ModelDocument = serde_json::from_value(value)?;
            if doc.name != name || doc.version != version {
                return Err(MlError::store(format!(
                    "{} declares {}@v{} but is stored as {name}@v{version}",
                    path.display(),
                    doc.name,
                    doc.version
                )));
            }
            RegressionModel::from_document(doc)?
        };

        if let Some(meta) = metadata {
            let actual = model.schema().fingerprint();
            if meta.fingerprint != actual {
                let detail = match &meta.schema {
                    Some(expected) => expected.diff(model.schema()).to_string(),
                    None => "fingerprint differs".to_string(),
                };
                return Err(MlError::schema_mismatch(format!(
                    "{}: metadata pins schema {} but model has {actual} ({detail})",
                    model.id(),
                    meta.fingerprint
                )));
            }
        }

        let fingerprint = model.schema().fingerprint();
        tracing::info!(
            model = %model.id(),
            trees = model.ensemble().num_trees(),
            fingerprint = %&fingerprint[..12],
            "Loaded model"
        );
        Ok(model)
    }

    fn save(&self, model: &RegressionModel) -> Result<PathBuf, MlError> {
        validate_name(model.name())?;
        let dir = self.model_dir(model.name(), model.version());
        let path = dir.join(MODEL_FILE);
        if path.exists() {
            return Err(MlError::AlreadyExists(model.id()));
        }
        std::fs::create_dir_all(&dir)?;

        let content = serde_json::to_string_pretty(&model.to_document())?;
        write_atomic(&path, &content)?;

        let metadata = ModelMetadata {
            name: model.name().to_string(),
            version: model.version(),
            schema: Some(model.schema().clone()),
            fingerprint: model.schema().fingerprint(),
            saved_at: Utc::now(),
            description: None,
        };
        write_atomic(
            &dir.join(METADATA_FILE),
            &serde_json::to_string_pretty(&metadata)?,
        )?;

        tracing::info!(model = %model.id(), path = %path.display(), "Saved model");
        Ok(path)
    }

    fn versions(&self, name: &str) -> Result<Vec<u32>, MlError> {
        validate_name(name)?;
        let dir = self.root.join(name);
        let mut versions = Vec::new();
        if dir.exists() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                if let Some(v) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                    if entry.path().join(MODEL_FILE).exists() {
                        versions.push(v);
                    }
                }
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}
