//! Regression tree fit on boosting residuals

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};

/// Tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Regression tree minimizing squared error. Only the regression form is
/// needed here: boosting fits trees on log-loss residuals, never on raw
/// class labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Option<Node>,
    max_depth: usize,
    min_samples_leaf: usize,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RegressionTree {
    pub fn new(max_depth: usize, min_samples_leaf: usize) -> Self {
        Self {
            root: None,
            max_depth,
            min_samples_leaf,
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    /// Fit the tree.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(RiskError::Shape {
                expected: format!("{n_samples} targets"),
                actual: format!("{} targets", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(RiskError::Data("Cannot fit a tree on zero rows".into()));
        }

        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build(x, y, &indices, 0, &mut importances));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = importances;
        Ok(self)
    }

    /// Predict one value per row.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(RiskError::ModelNotFitted)?;
        let predictions: Vec<f64> = (0..x.nrows())
            .map(|i| Self::predict_sample(root, &x.row(i).to_vec()))
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub(crate) fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    pub(crate) fn from_root(
        root: Node,
        max_depth: usize,
        min_samples_leaf: usize,
        n_features: usize,
        feature_importances: Vec<f64>,
    ) -> Self {
        Self {
            root: Some(root),
            max_depth,
            min_samples_leaf,
            n_features,
            feature_importances,
        }
    }

    pub(crate) fn params(&self) -> (usize, usize, usize) {
        (self.max_depth, self.min_samples_leaf, self.n_features)
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
    ) -> Node {
        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();

        let should_stop = indices.len() < 2 * self.min_samples_leaf
            || depth >= self.max_depth
            || Self::is_constant(&y_subset);
        if should_stop {
            return Node::Leaf {
                value: Self::mean(&y_subset),
            };
        }

        match self.best_split(x, y, indices) {
            Some((feature, threshold, gain)) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature]] <= threshold);

                if left_idx.len() < self.min_samples_leaf
                    || right_idx.len() < self.min_samples_leaf
                {
                    return Node::Leaf {
                        value: Self::mean(&y_subset),
                    };
                }

                importances[feature] += indices.len() as f64 * gain;

                let left = Box::new(self.build(x, y, &left_idx, depth + 1, importances));
                let right = Box::new(self.build(x, y, &right_idx, depth + 1, importances));
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }
            }
            None => Node::Leaf {
                value: Self::mean(&y_subset),
            },
        }
    }

    /// Scan features in parallel; each feature independently finds its best
    /// threshold by variance reduction.
    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let n = indices.len() as f64;
        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
        let parent_impurity = Self::variance(&y_subset);

        let candidates: Vec<Option<(usize, f64, f64)>> = (0..x.ncols())
            .into_par_iter()
            .map(|feature| {
                let mut values: Vec<f64> = indices.iter().map(|&i| x[[i, feature]]).collect();
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                values.dedup();

                let mut best_gain = 0.0f64;
                let mut best_threshold = 0.0f64;

                for window in values.windows(2) {
                    let threshold = (window[0] + window[1]) / 2.0;

                    let mut left_count = 0usize;
                    let mut left_sum = 0.0f64;
                    let mut left_sq = 0.0f64;
                    let mut right_count = 0usize;
                    let mut right_sum = 0.0f64;
                    let mut right_sq = 0.0f64;

                    for &i in indices {
                        let yi = y[i];
                        if x[[i, feature]] <= threshold {
                            left_count += 1;
                            left_sum += yi;
                            left_sq += yi * yi;
                        } else {
                            right_count += 1;
                            right_sum += yi;
                            right_sq += yi * yi;
                        }
                    }

                    if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                        continue;
                    }

                    let left_var = left_sq / left_count as f64
                        - (left_sum / left_count as f64).powi(2);
                    let right_var = right_sq / right_count as f64
                        - (right_sum / right_count as f64).powi(2);
                    let weighted =
                        (left_count as f64 * left_var + right_count as f64 * right_var) / n;

                    let gain = parent_impurity - weighted;
                    if gain > best_gain {
                        best_gain = gain;
                        best_threshold = threshold;
                    }
                }

                (best_gain > 0.0).then_some((feature, best_threshold, best_gain))
            })
            .collect();

        candidates
            .into_iter()
            .flatten()
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn predict_sample(node: &Node, sample: &[f64]) -> f64 {
        match node {
            Node::Leaf { value } => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    Self::predict_sample(left, sample)
                } else {
                    Self::predict_sample(right, sample)
                }
            }
        }
    }

    fn mean(y: &[f64]) -> f64 {
        if y.is_empty() {
            0.0
        } else {
            y.iter().sum::<f64>() / y.len() as f64
        }
    }

    fn variance(y: &[f64]) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(y);
        y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / y.len() as f64
    }

    fn is_constant(y: &[f64]) -> bool {
        y.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fits_step_function() {
        let x = Array2::from_shape_vec((10, 1), (0..10).map(|i| i as f64).collect()).unwrap();
        let y: Array1<f64> = (0..10).map(|i| if i < 5 { 0.0 } else { 1.0 }).collect();

        let mut tree = RegressionTree::new(3, 1);
        tree.fit(&x, &y).unwrap();

        let preds = tree.predict(&x).unwrap();
        for i in 0..10 {
            let expected = if i < 5 { 0.0 } else { 1.0 };
            assert!((preds[i] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_max_depth_limits_splits() {
        let x = Array2::from_shape_vec((8, 1), (0..8).map(|i| i as f64).collect()).unwrap();
        let y: Array1<f64> = (0..8).map(|i| i as f64).collect();

        let mut tree = RegressionTree::new(1, 1);
        tree.fit(&x, &y).unwrap();

        // Depth 1 means a single split: exactly two distinct predictions.
        let preds = tree.predict(&x).unwrap();
        let mut distinct: Vec<f64> = preds.to_vec();
        distinct.sort_by(|a, b| a.partial_cmp(b).unwrap());
        distinct.dedup();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn test_shape_mismatch() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        let mut tree = RegressionTree::new(3, 1);
        assert!(matches!(tree.fit(&x, &y), Err(RiskError::Shape { .. })));
    }

    #[test]
    fn test_unfitted_predict_errors() {
        let tree = RegressionTree::new(3, 1);
        let x = array![[1.0]];
        assert!(matches!(tree.predict(&x), Err(RiskError::ModelNotFitted)));
    }

    #[test]
    fn test_importances_favor_informative_feature() {
        let mut rows = Vec::new();
        for i in 0..20 {
            rows.push(i as f64);
            rows.push(0.0); // constant second feature
        }
        let x = Array2::from_shape_vec((20, 2), rows).unwrap();
        let y: Array1<f64> = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();

        let mut tree = RegressionTree::new(3, 1);
        tree.fit(&x, &y).unwrap();
        let imp = tree.feature_importances();
        assert!(imp[0] > imp[1]);
    }
}
