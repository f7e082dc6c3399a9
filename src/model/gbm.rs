//! Gradient-boosted tree classifier
//!
//! Binary classifier boosting regression trees on log-loss residuals in
//! log-odds space. Training is deterministic: row and column subsampling
//! draw from a seeded generator.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::tree::RegressionTree;
use super::{Capability, RiskModel};
use crate::error::{Result, RiskError};

/// Boosting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmConfig {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage applied to each tree's contribution.
    pub learning_rate: f64,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum samples per leaf.
    pub min_samples_leaf: usize,
    /// Row subsample ratio per round.
    pub subsample: f64,
    /// Column subsample ratio per round.
    pub colsample: f64,
    /// Seed for subsampling. Training must be reproducible run to run.
    pub seed: u64,
}

impl Default for GbmConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 4,
            min_samples_leaf: 5,
            subsample: 0.8,
            colsample: 0.8,
            seed: 42,
        }
    }
}

const GBM_CAPABILITIES: &[Capability] =
    &[Capability::Probability, Capability::Score, Capability::Label];

/// Gradient-boosted binary classifier over {0, 1} labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmClassifier {
    config: GbmConfig,
    trees: Vec<RegressionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_log_odds: f64,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl GbmClassifier {
    pub fn new(config: GbmConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_log_odds: 0.0,
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    pub fn config(&self) -> &GbmConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Fit on a numeric matrix and {0, 1} targets.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(RiskError::Shape {
                expected: format!("{n_samples} targets"),
                actual: format!("{} targets", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(RiskError::Data(
                "Cannot fit classifier on an empty matrix".into(),
            ));
        }

        self.n_features = n_features;
        self.trees.clear();
        self.col_indices_per_tree.clear();

        let prevalence = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (prevalence / (1.0 - prevalence)).ln();

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed);
        self.feature_importances = vec![0.0; n_features];

        for _ in 0..self.config.n_estimators {
            // Gradient of the log loss in log-odds space.
            let residuals: Array1<f64> = y
                .iter()
                .zip(log_odds.iter())
                .map(|(yi, lo)| yi - sigmoid(*lo))
                .collect();

            let row_idx = sample_indices(n_samples, self.config.subsample, &mut rng);
            let col_idx = sample_indices(n_features, self.config.colsample, &mut rng);

            let x_sub = x
                .select(ndarray::Axis(0), &row_idx)
                .select(ndarray::Axis(1), &col_idx);
            let r_sub: Array1<f64> = row_idx.iter().map(|&i| residuals[i]).collect();

            let mut tree =
                RegressionTree::new(self.config.max_depth, self.config.min_samples_leaf);
            tree.fit(&x_sub, &r_sub)?;

            // Update every row so the next round sees fresh gradients.
            let x_cols = x.select(ndarray::Axis(1), &col_idx);
            let update = tree.predict(&x_cols)?;
            for i in 0..n_samples {
                log_odds[i] += self.config.learning_rate * update[i];
            }

            for (j, &col) in col_idx.iter().enumerate() {
                if let Some(imp) = tree.feature_importances().get(j) {
                    self.feature_importances[col] += imp;
                }
            }

            self.trees.push(tree);
            self.col_indices_per_tree.push(col_idx);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }

        Ok(self)
    }

    /// Raw log-odds per row.
    pub fn raw_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(RiskError::ModelNotFitted);
        }
        let n = x.nrows();
        let mut log_odds = Array1::from_elem(n, self.initial_log_odds);
        for (tree, col_idx) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let x_cols = x.select(ndarray::Axis(1), col_idx);
            let update = tree.predict(&x_cols)?;
            for i in 0..n {
                log_odds[i] += self.config.learning_rate * update[i];
            }
        }
        Ok(log_odds)
    }

    /// Positive-class probability per row.
    pub fn positive_probability(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.raw_scores(x)?.mapv(sigmoid))
    }

    pub(crate) fn from_parts(
        config: GbmConfig,
        trees: Vec<RegressionTree>,
        col_indices_per_tree: Vec<Vec<usize>>,
        initial_log_odds: f64,
        n_features: usize,
        feature_importances: Vec<f64>,
    ) -> Self {
        Self {
            config,
            trees,
            col_indices_per_tree,
            initial_log_odds,
            n_features,
            feature_importances,
        }
    }

    pub(crate) fn parts(
        &self,
    ) -> (
        &GbmConfig,
        &[RegressionTree],
        &[Vec<usize>],
        f64,
        usize,
        &[f64],
    ) {
        (
            &self.config,
            &self.trees,
            &self.col_indices_per_tree,
            self.initial_log_odds,
            self.n_features,
            &self.feature_importances,
        )
    }
}

impl RiskModel for GbmClassifier {
    fn capabilities(&self) -> &[Capability] {
        GBM_CAPABILITIES
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let p = self.positive_probability(x)?;
        let mut out = Array2::zeros((x.nrows(), 2));
        for (i, &pi) in p.iter().enumerate() {
            out[[i, 0]] = 1.0 - pi;
            out[[i, 1]] = pi;
        }
        Ok(out)
    }

    fn decision_score(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let scores = self.raw_scores(x)?;
        Ok(scores.insert_axis(ndarray::Axis(1)))
    }

    fn predict_label(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let p = self.positive_probability(x)?;
        Ok(p.mapv(|pi| if pi >= 0.5 { 1.0 } else { 0.0 })
            .insert_axis(ndarray::Axis(1)))
    }
}

pub(crate) fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let size = ((n as f64) * ratio).ceil().max(1.0) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(size.min(n));
    indices.sort_unstable();
    indices
}
