//! One-vs-rest composite over correlated binary outcomes

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::gbm::{GbmClassifier, GbmConfig};
use super::{Capability, RiskModel};
use crate::error::{Result, RiskError};

const OVR_CAPABILITIES: &[Capability] =
    &[Capability::Probability, Capability::Score, Capability::Label];

/// Independent sub-model per component outcome. Component order is fixed at
/// fit time and matches the schema's component list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneVsRestClassifier {
    components: Vec<String>,
    estimators: Vec<GbmClassifier>,
}

impl OneVsRestClassifier {
    /// Fit one sub-model per component. `targets` holds one {0, 1} label
    /// vector per component, in component order.
    pub fn fit(
        x: &Array2<f64>,
        targets: &[Array1<f64>],
        components: Vec<String>,
        config: &GbmConfig,
    ) -> Result<Self> {
        if targets.len() != components.len() {
            return Err(RiskError::Shape {
                expected: format!("{} target vectors", components.len()),
                actual: format!("{} target vectors", targets.len()),
            });
        }
        if components.is_empty() {
            return Err(RiskError::Data(
                "Composite fit requires at least one component".into(),
            ));
        }

        let mut estimators = Vec::with_capacity(components.len());
        for (idx, y) in targets.iter().enumerate() {
            // Offset the seed per component so sub-models draw distinct
            // subsamples while the whole fit stays reproducible.
            let sub_config = GbmConfig {
                seed: config.seed.wrapping_add(idx as u64),
                ..config.clone()
            };
            let mut estimator = GbmClassifier::new(sub_config);
            estimator.fit(x, y)?;
            estimators.push(estimator);
        }

        Ok(Self {
            components,
            estimators,
        })
    }

    /// Assemble from already-fitted sub-models (migration reconstruction).
    pub fn from_parts(components: Vec<String>, estimators: Vec<GbmClassifier>) -> Self {
        Self {
            components,
            estimators,
        }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn estimators(&self) -> &[GbmClassifier] {
        &self.estimators
    }

    fn collect_columns<F>(&self, x: &Array2<f64>, f: F) -> Result<Array2<f64>>
    where
        F: Fn(&GbmClassifier) -> Result<Array1<f64>>,
    {
        let mut out = Array2::zeros((x.nrows(), self.estimators.len()));
        for (j, estimator) in self.estimators.iter().enumerate() {
            let col = f(estimator)?;
            for (i, v) in col.iter().enumerate() {
                out[[i, j]] = *v;
            }
        }
        Ok(out)
    }
}

impl RiskModel for OneVsRestClassifier {
    fn capabilities(&self) -> &[Capability] {
        OVR_CAPABILITIES
    }

    fn n_outputs(&self) -> usize {
        self.estimators.len()
    }

    /// Rows × components, positive-class probability per component.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.collect_columns(x, |e| e.positive_probability(x))
    }

    fn decision_score(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.collect_columns(x, |e| e.raw_scores(x))
    }

    fn predict_label(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.collect_columns(x, |e| {
            Ok(e.positive_probability(x)?
                .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
        })
    }
}
