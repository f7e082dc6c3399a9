//! Offline training pipeline
//!
//! Batch job that fits a preprocessing pipeline and a gradient-boosted
//! classifier per disease key, plus a one-vs-rest composite for the
//! correlated cardiovascular outcomes, and records the realized feature
//! lists into the schema. Runs out-of-band, never on the serving path; the
//! caller must not run two training jobs against the same model directory
//! concurrently.

pub mod metrics;
mod pipeline;

pub use metrics::EvalMetrics;
pub use pipeline::{train_and_save_all_models, BatchReport, FitReport, Trainer};

use serde::{Deserialize, Serialize};

use crate::model::GbmConfig;

/// Raw survey code for an affirmative outcome answer.
pub const RAW_POSITIVE: f64 = 1.0;
/// Raw survey code for a negative outcome answer. Everything else (refused,
/// don't know, missing) invalidates the row for that target.
pub const RAW_NEGATIVE: f64 = 2.0;

/// One single-outcome training target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Disease key the fitted pair is registered under.
    pub key: String,
    /// Label column in the source table.
    pub target_column: String,
    /// Candidate feature columns, in schema order.
    pub features: Vec<String>,
    /// Features kept even when majority-missing.
    pub mandated: Vec<String>,
}

/// One component of the composite target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Component outcome name recorded in the schema.
    pub name: String,
    /// Label column in the source table.
    pub column: String,
}

/// The composite (multi-output) training target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeSpec {
    pub key: String,
    /// Ordered components; order is recorded in the schema.
    pub components: Vec<ComponentSpec>,
    pub features: Vec<String>,
    pub mandated: Vec<String>,
}

/// Training run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Seed for the train/eval split. Boosting has its own seed in `gbm`.
    pub seed: u64,
    /// Fraction of valid rows held out for evaluation.
    pub eval_fraction: f64,
    /// Columns with a higher missing fraction are dropped unless mandated.
    pub max_missing_fraction: f64,
    pub gbm: GbmConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            eval_fraction: 0.2,
            max_missing_fraction: 0.5,
            gbm: GbmConfig::default(),
        }
    }
}

fn base_features() -> Vec<String> {
    [
        "age",
        "sex",
        "bmi",
        "waist_circumference",
        "systolic_bp",
        "diastolic_bp",
        "total_cholesterol",
        "hdl_cholesterol",
        "glucose",
        "smoker",
        "alcohol_use",
        "physical_activity",
        "family_history",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Default single-outcome targets for the standard batch run.
pub fn default_targets() -> Vec<TargetSpec> {
    ["Diabetes", "Liver Condition", "Weak/Failing Kidney"]
        .into_iter()
        .zip(["diabetes_dx", "liver_condition_dx", "kidney_failing_dx"])
        .map(|(key, column)| TargetSpec {
            key: key.to_string(),
            target_column: column.to_string(),
            features: base_features(),
            mandated: vec!["age".to_string(), "sex".to_string()],
        })
        .collect()
}

/// Default composite target: four correlated cardiovascular outcomes.
pub fn default_composite() -> CompositeSpec {
    CompositeSpec {
        key: "CVD".to_string(),
        components: [
            ("Congestive Heart Failure", "chf_dx"),
            ("Coronary Heart Disease", "chd_dx"),
            ("Heart Attack", "heart_attack_dx"),
            ("Stroke", "stroke_dx"),
        ]
        .into_iter()
        .map(|(name, column)| ComponentSpec {
            name: name.to_string(),
            column: column.to_string(),
        })
        .collect(),
        features: base_features(),
        mandated: vec!["age".to_string(), "sex".to_string()],
    }
}
