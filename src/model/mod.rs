//! Estimators and their invocation capabilities
//!
//! Estimators declare an explicit, tagged capability set instead of being
//! probed for methods at call time. The dispatcher tries declared
//! capabilities in fixed rank order: probability, then score, then label.

pub mod flat;
mod gbm;
mod one_vs_rest;
mod tree;

pub use flat::{FlatTree, GbmInterchange, InterchangeDoc, INTERCHANGE_FORMAT_VERSION};
pub use gbm::{GbmClassifier, GbmConfig};
pub use one_vs_rest::OneVsRestClassifier;
pub use tree::RegressionTree;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Ranked model-invocation capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    /// Per-class probabilities.
    Probability,
    /// Real-valued decision scores.
    Score,
    /// Hard predicted labels.
    Label,
}

/// A fitted estimator usable by the prediction dispatcher.
pub trait RiskModel: Send + Sync {
    /// Capabilities this estimator declares, in no particular order; the
    /// dispatcher imposes the rank.
    fn capabilities(&self) -> &[Capability];

    /// Number of independent outcome outputs. 1 for single-outcome
    /// estimators; the component count for composite estimators.
    fn n_outputs(&self) -> usize {
        1
    }

    /// Probabilities, rows × classes for single-outcome estimators, rows ×
    /// components (positive-class probability each) for composites.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Raw decision scores, rows × outputs.
    fn decision_score(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Hard labels, rows × outputs.
    fn predict_label(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Serializable envelope for the two concrete estimator kinds an artifact
/// file may hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelArtifact {
    Single(GbmClassifier),
    Composite(OneVsRestClassifier),
}

impl ModelArtifact {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelArtifact::Single(_) => "single",
            ModelArtifact::Composite(_) => "composite",
        }
    }

    fn inner(&self) -> &dyn RiskModel {
        match self {
            ModelArtifact::Single(m) => m,
            ModelArtifact::Composite(m) => m,
        }
    }
}

impl RiskModel for ModelArtifact {
    fn capabilities(&self) -> &[Capability] {
        self.inner().capabilities()
    }

    fn n_outputs(&self) -> usize {
        self.inner().n_outputs()
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.inner().predict_proba(x)
    }

    fn decision_score(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.inner().decision_score(x)
    }

    fn predict_label(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.inner().predict_label(x)
    }
}
