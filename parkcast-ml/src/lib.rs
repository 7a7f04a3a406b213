//! # parkcast-ml: models and schemas
//!
//! Everything needed to evaluate a trained regressor against a feature row:
//!
//! - [`schema`]: ordered, fingerprinted feature schemas
//! - [`ensemble`]: gradient-boosted regression tree evaluation
//! - [`xgboost`]: import of XGBoost JSON model dumps
//! - [`model`]: a named, versioned regressor bound to its schema
//! - [`store`]: loading and saving models by name and version
//!
//! Training is out of scope; models are produced offline.

pub mod ensemble;
pub mod error;
pub mod model;
pub mod schema;
pub mod store;
pub mod xgboost;

// Re-exports
pub use ensemble::{Node, Objective, Tree, TreeEnsemble};
pub use error::MlError;
pub use model::RegressionModel;
pub use schema::{FeatureSchema, FieldSpec, FieldType, SchemaDiff};
pub use store::{LocalModelStore, ModelMetadata, ModelStore, ModelVersion};
pub use xgboost::{ImportedModel, import_xgboost_json};
