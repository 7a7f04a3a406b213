//! Ordered, typed feature schemas that bind a model to its input layout.
//!
//! A schema is the contract between whoever builds feature rows and the model
//! that consumes them. Two schemas match only when they list the same field
//! names in the same order; field types are descriptive and do not take part
//! in matching.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// Field data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Boolean,
    Categorical,
}

impl FieldType {
    /// Map an XGBoost `feature_types` entry onto a field type.
    pub fn from_xgboost(tag: &str) -> Self {
        match tag {
            "int" => FieldType::Integer,
            "i" => FieldType::Boolean,
            "c" => FieldType::Categorical,
            _ => FieldType::Float,
        }
    }
}

/// Schema for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub dtype: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, dtype: FieldType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }
}

/// Ordered list of named, typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    #[serde(default = "default_schema_version")]
    pub version: u32,
    pub fields: Vec<FieldSpec>,
}

fn default_schema_version() -> u32 {
    1
}

impl FeatureSchema {
    /// Create a schema, rejecting empty layouts and duplicate names.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, MlError> {
        if fields.is_empty() {
            return Err(MlError::invalid_input("schema has no fields"));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(MlError::invalid_input(format!(
                    "duplicate field '{}' in schema",
                    field.name
                )));
            }
        }
        Ok(Self {
            version: default_schema_version(),
            fields,
        })
    }

    /// Convenience constructor for all-float schemas.
    pub fn from_names<I, S>(names: I) -> Result<Self, MlError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(FieldSpec::float).collect())
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// SHA-256 over the ordered field names, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for name in self.names() {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// True when both schemas list the same names in the same order.
    pub fn matches(&self, other: &FeatureSchema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name)
    }

    /// Describe how `actual` deviates from `self`.
    pub fn diff(&self, actual: &FeatureSchema) -> SchemaDiff {
        let expected: HashSet<&str> = self.names().collect();
        let present: HashSet<&str> = actual.names().collect();
        let missing = self
            .names()
            .filter(|n| !present.contains(n))
            .map(String::from)
            .collect::<Vec<_>>();
        let unexpected = actual
            .names()
            .filter(|n| !expected.contains(n))
            .map(String::from)
            .collect::<Vec<_>>();
        let reordered = missing.is_empty() && unexpected.is_empty() && !self.matches(actual);
        SchemaDiff {
            missing,
            unexpected,
            reordered,
        }
    }

    /// Fail with [`MlError::SchemaMismatch`] unless `actual` matches `self`.
    pub fn ensure_matches(&self, actual: &FeatureSchema) -> Result<(), MlError> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(MlError::schema_mismatch(self.diff(actual).to_string()))
        }
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.names().collect();
        write!(f, "v{} [{}]", self.version, names.join(", "))
    }
}

/// Difference between an expected and an actual schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub reordered: bool,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && !self.reordered
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing [{}]", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected [{}]", self.unexpected.join(", ")));
        }
        if self.reordered {
            parts.push("same fields in a different order".to_string());
        }
        if parts.is_empty() {
            write!(f, "no difference")
        } else {
            write!(f, "{}", parts.join("; "))
        }
    }
}
