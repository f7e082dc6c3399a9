//! Error types for the risk engine

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum RiskError {
    /// Key absent from the feature schema. Rejected before any artifact I/O.
    #[error("Unknown disease key '{0}'")]
    UnknownDiseaseKey(String),

    /// Preprocessing or model artifact file missing for a key.
    #[error("Missing model artifacts for '{key}'. Expected: {preproc} and {model}")]
    ArtifactNotFound {
        key: String,
        preproc: PathBuf,
        model: PathBuf,
    },

    /// Schema-required inputs omitted from a prediction request.
    #[error("Missing features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    /// Every capability attempt raised; wraps the last underlying failure.
    #[error("Prediction failed: {0}")]
    PredictionFailed(#[source] Box<RiskError>),

    /// Zero usable features survived filtering for a training target.
    #[error("Training configuration error: {0}")]
    TrainingConfiguration(String),

    /// A sub-component of an artifact failed migration conversion.
    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Model is not fitted")]
    ModelNotFitted,

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RiskError {
    fn from(e: serde_json::Error) -> Self {
        RiskError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for RiskError {
    fn from(e: bincode::Error) -> Self {
        RiskError::Serialization(e.to_string())
    }
}

impl From<polars::prelude::PolarsError> for RiskError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        RiskError::Data(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;
