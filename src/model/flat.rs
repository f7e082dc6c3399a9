//! Version-portable interchange form for fitted estimators
//!
//! Artifact files are bincode-encoded Rust structs, which ties them to the
//! exact shape of those structs. The interchange form flattens every tree
//! into parallel node arrays inside a JSON document with an explicit format
//! version, so a legacy artifact can be re-serialized by round-tripping
//! through a representation that survives struct changes. Used only by the
//! migration tool, never on the serving path.

use serde::{Deserialize, Serialize};

use super::gbm::{GbmClassifier, GbmConfig};
use super::one_vs_rest::OneVsRestClassifier;
use super::tree::{Node, RegressionTree};
use super::ModelArtifact;
use crate::error::{Result, RiskError};

pub const INTERCHANGE_FORMAT_VERSION: u32 = 1;

/// A tree flattened into parallel arrays. Node `i` is a split when
/// `feature[i] >= 0` (children at `left[i]`/`right[i]`), a leaf otherwise
/// (prediction in `value[i]`). The root is node 0 and children always come
/// after their parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatTree {
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub left: Vec<i64>,
    pub right: Vec<i64>,
    pub value: Vec<f64>,
}

impl FlatTree {
    fn push_node(&mut self, node: &Node) -> usize {
        let idx = self.feature.len();
        // Reserve the slot first so children index correctly.
        self.feature.push(-1);
        self.threshold.push(0.0);
        self.left.push(-1);
        self.right.push(-1);
        self.value.push(0.0);

        match node {
            Node::Leaf { value } => {
                self.value[idx] = *value;
            }
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                self.feature[idx] = *feature as i64;
                self.threshold[idx] = *threshold;
                let left_idx = self.push_node(left);
                let right_idx = self.push_node(right);
                self.left[idx] = left_idx as i64;
                self.right[idx] = right_idx as i64;
            }
        }
        idx
    }

    fn rebuild_node(&self, idx: usize) -> Result<Node> {
        let n = self.feature.len();
        if idx >= n {
            return Err(RiskError::Conversion(format!(
                "Tree node index {idx} out of bounds ({n} nodes)"
            )));
        }
        if self.feature[idx] < 0 {
            return Ok(Node::Leaf {
                value: self.value[idx],
            });
        }

        let (left, right) = (self.left[idx], self.right[idx]);
        // Children strictly after the parent rules out cycles.
        if left <= idx as i64 || right <= idx as i64 {
            return Err(RiskError::Conversion(format!(
                "Malformed tree: node {idx} links backwards"
            )));
        }
        Ok(Node::Split {
            feature: self.feature[idx] as usize,
            threshold: self.threshold[idx],
            left: Box::new(self.rebuild_node(left as usize)?),
            right: Box::new(self.rebuild_node(right as usize)?),
        })
    }

    pub fn from_tree(tree: &RegressionTree) -> Result<Self> {
        let root = tree
            .root()
            .ok_or_else(|| RiskError::Conversion("Tree has no fitted nodes".into()))?;
        let mut flat = FlatTree::default();
        flat.push_node(root);
        Ok(flat)
    }

    pub fn into_tree(
        &self,
        max_depth: usize,
        min_samples_leaf: usize,
        n_features: usize,
    ) -> Result<RegressionTree> {
        if self.feature.is_empty() {
            return Err(RiskError::Conversion("Flat tree carries no nodes".into()));
        }
        let lens = [
            self.threshold.len(),
            self.left.len(),
            self.right.len(),
            self.value.len(),
        ];
        if lens.iter().any(|&l| l != self.feature.len()) {
            return Err(RiskError::Conversion(
                "Flat tree arrays have mismatched lengths".into(),
            ));
        }
        let root = self.rebuild_node(0)?;
        Ok(RegressionTree::from_root(
            root,
            max_depth,
            min_samples_leaf,
            n_features,
            Vec::new(),
        ))
    }
}

/// One estimator in interchange form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmInterchange {
    pub format_version: u32,
    pub config: GbmConfig,
    pub initial_log_odds: f64,
    pub n_features: usize,
    pub trees: Vec<FlatTree>,
    pub col_indices: Vec<Vec<usize>>,
    pub feature_importances: Vec<f64>,
}

impl GbmClassifier {
    /// Extract into the neutral interchange form.
    pub fn to_interchange(&self) -> Result<GbmInterchange> {
        if !self.is_fitted() {
            return Err(RiskError::Conversion(
                "Estimator has no trees; nothing to convert".into(),
            ));
        }
        let (config, trees, col_indices, initial_log_odds, n_features, importances) =
            self.parts();
        Ok(GbmInterchange {
            format_version: INTERCHANGE_FORMAT_VERSION,
            config: config.clone(),
            initial_log_odds,
            n_features,
            trees: trees.iter().map(FlatTree::from_tree).collect::<Result<_>>()?,
            col_indices: col_indices.to_vec(),
            feature_importances: importances.to_vec(),
        })
    }

    /// Reconstruct a fresh estimator from interchange form.
    pub fn from_interchange(ic: &GbmInterchange) -> Result<Self> {
        if ic.format_version != INTERCHANGE_FORMAT_VERSION {
            return Err(RiskError::Conversion(format!(
                "Unsupported interchange format version {}",
                ic.format_version
            )));
        }
        if ic.trees.len() != ic.col_indices.len() {
            return Err(RiskError::Conversion(format!(
                "Interchange carries {} trees but {} column index sets",
                ic.trees.len(),
                ic.col_indices.len()
            )));
        }
        let trees = ic
            .trees
            .iter()
            .zip(&ic.col_indices)
            .map(|(flat, cols)| {
                flat.into_tree(ic.config.max_depth, ic.config.min_samples_leaf, cols.len())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GbmClassifier::from_parts(
            ic.config.clone(),
            trees,
            ic.col_indices.clone(),
            ic.initial_log_odds,
            ic.n_features,
            ic.feature_importances.clone(),
        ))
    }
}

/// Whole-artifact interchange document, one per migrated artifact file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterchangeDoc {
    pub format_version: u32,
    pub kind: String,
    /// Component names for composite artifacts; empty for single.
    pub components: Vec<String>,
    pub estimators: Vec<GbmInterchange>,
}

impl InterchangeDoc {
    /// Extract every underlying estimator. Fails as a whole if any
    /// sub-component fails.
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        let (components, estimators) = match artifact {
            ModelArtifact::Single(gbm) => (Vec::new(), vec![gbm.to_interchange()?]),
            ModelArtifact::Composite(ovr) => (
                ovr.components().to_vec(),
                ovr.estimators()
                    .iter()
                    .map(|e| e.to_interchange())
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        Ok(Self {
            format_version: INTERCHANGE_FORMAT_VERSION,
            kind: artifact.kind().to_string(),
            components,
            estimators,
        })
    }

    /// Reconstruct a fresh artifact of the original kind.
    pub fn into_artifact(&self) -> Result<ModelArtifact> {
        match self.kind.as_str() {
            "single" => {
                let gbm = self
                    .estimators
                    .first()
                    .ok_or_else(|| RiskError::Conversion("Single artifact without estimator".into()))?;
                Ok(ModelArtifact::Single(GbmClassifier::from_interchange(gbm)?))
            }
            "composite" => {
                if self.estimators.len() != self.components.len() {
                    return Err(RiskError::Conversion(format!(
                        "Composite carries {} estimators for {} components",
                        self.estimators.len(),
                        self.components.len()
                    )));
                }
                let estimators = self
                    .estimators
                    .iter()
                    .map(GbmClassifier::from_interchange)
                    .collect::<Result<Vec<_>>>()?;
                Ok(ModelArtifact::Composite(OneVsRestClassifier::from_parts(
                    self.components.clone(),
                    estimators,
                )))
            }
            other => Err(RiskError::Conversion(format!(
                "Unknown artifact kind '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskModel;
    use ndarray::{Array1, Array2};

    fn fitted_gbm() -> (GbmClassifier, Array2<f64>) {
        let x = Array2::from_shape_vec((60, 1), (0..60).map(|i| i as f64).collect()).unwrap();
        let y: Array1<f64> = (0..60).map(|i| if i > 30 { 1.0 } else { 0.0 }).collect();
        let mut model = GbmClassifier::new(GbmConfig {
            n_estimators: 10,
            max_depth: 2,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        (model, x)
    }

    #[test]
    fn test_interchange_round_trip_preserves_predictions() {
        let (model, x) = fitted_gbm();
        let ic = model.to_interchange().unwrap();
        let json = serde_json::to_string(&ic).unwrap();
        let parsed: GbmInterchange = serde_json::from_str(&json).unwrap();
        let restored = GbmClassifier::from_interchange(&parsed).unwrap();

        let before = model.positive_probability(&x).unwrap();
        let after = restored.positive_probability(&x).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_unfitted_estimator_fails_conversion() {
        let model = GbmClassifier::new(GbmConfig::default());
        assert!(matches!(
            model.to_interchange(),
            Err(RiskError::Conversion(_))
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let (model, _) = fitted_gbm();
        let mut ic = model.to_interchange().unwrap();
        ic.format_version = 99;
        assert!(matches!(
            GbmClassifier::from_interchange(&ic),
            Err(RiskError::Conversion(_))
        ));
    }

    #[test]
    fn test_backward_link_rejected() {
        let (model, _) = fitted_gbm();
        let mut ic = model.to_interchange().unwrap();
        // Corrupt the first split to point at itself.
        if let Some(tree) = ic.trees.iter_mut().find(|t| t.feature[0] >= 0) {
            tree.left[0] = 0;
        }
        assert!(matches!(
            GbmClassifier::from_interchange(&ic),
            Err(RiskError::Conversion(_))
        ));
    }

    #[test]
    fn test_composite_doc_round_trip() {
        let (model, x) = fitted_gbm();
        let artifact = ModelArtifact::Composite(OneVsRestClassifier::from_parts(
            vec!["a".into(), "b".into()],
            vec![model.clone(), model.clone()],
        ));

        let doc = InterchangeDoc::from_artifact(&artifact).unwrap();
        let rebuilt = doc.into_artifact().unwrap();

        let before = artifact.predict_proba(&x).unwrap();
        let after = rebuilt.predict_proba(&x).unwrap();
        assert_eq!(before, after);
    }
}
