//! Error types for the parkcast-ml crate.

use thiserror::Error;

/// Top-level error type for model and schema operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unsupported objective: {0}")]
    UnsupportedObjective(String),

    #[error("Model store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MlError {
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
