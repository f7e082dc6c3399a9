//! Prediction dispatcher
//!
//! The engine's whole public surface as consumed by the serving layer:
//! `list_models`, `expected_features`, `predict_risk`. Prediction is a pure
//! function of loaded artifact state and validated input — synchronous, no
//! internal parallelism, never mutates the cache.

pub mod cascade;

use tracing::debug;

use crate::error::{Result, RiskError};
use crate::registry::ModelRegistry;
use crate::validator::{self, RawFeatures};

/// Risk prediction engine over a loaded registry.
pub struct RiskEngine {
    registry: ModelRegistry,
}

impl RiskEngine {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// All disease keys the schema knows about.
    pub fn list_models(&self) -> Vec<String> {
        self.registry.list_available()
    }

    /// Ordered feature list a caller must supply for a key.
    pub fn expected_features(&self, key: &str) -> Result<Vec<String>> {
        self.registry.expected_features(key)
    }

    /// Predict the calibrated risk for one key, in [0, 1].
    ///
    /// Unknown keys are rejected from the schema alone, before any artifact
    /// I/O; missing features are rejected before loading too. For composite
    /// keys the returned risk is the maximum across component outcomes, so
    /// any single elevated component drives the aggregate.
    pub fn predict_risk(&self, key: &str, features: &RawFeatures) -> Result<f64> {
        let expected = self.registry.expected_features(key)?;
        validator::validate(&expected, features)?;

        let loaded = self.registry.load(key)?;
        let row = validator::coerce_row(&loaded.features, features);
        let x = loaded.pipeline.transform_row(&row)?;

        let risks = cascade::component_risks(&loaded.model, &x)?;
        let risk = risks
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if !risk.is_finite() {
            return Err(RiskError::Data(format!(
                "Estimator for '{key}' produced no usable risk score"
            )));
        }

        debug!(key, risk, outputs = risks.len(), "prediction complete");
        Ok(risk)
    }
}
