//! Held-out evaluation metrics

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Classification metrics computed on the evaluation split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub accuracy: Option<f64>,
    /// Area under the ROC curve; absent when the split holds one class.
    pub auc: Option<f64>,
    pub n_samples: usize,
}

impl EvalMetrics {
    pub fn empty() -> Self {
        Self {
            accuracy: None,
            auc: None,
            n_samples: 0,
        }
    }

    /// Compute from {0, 1} targets and positive-class probabilities.
    pub fn compute(y_true: &Array1<f64>, probs: &Array1<f64>) -> Self {
        let n = y_true.len();
        if n == 0 {
            return Self::empty();
        }

        let correct = y_true
            .iter()
            .zip(probs.iter())
            .filter(|(y, p)| (**p >= 0.5) == (**y >= 0.5))
            .count();
        let accuracy = Some(correct as f64 / n as f64);

        Self {
            accuracy,
            auc: roc_auc(y_true, probs),
            n_samples: n,
        }
    }
}

/// Rank-based AUC (Mann-Whitney), with tied scores sharing their average
/// rank. `None` when either class is absent.
fn roc_auc(y_true: &Array1<f64>, probs: &Array1<f64>) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y >= 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..y_true.len()).collect();
    order.sort_by(|&a, &b| {
        probs[a]
            .partial_cmp(&probs[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; y_true.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y >= 0.5)
        .map(|(_, r)| r)
        .sum();

    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_separation() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let p = array![0.1, 0.2, 0.8, 0.9];
        let m = EvalMetrics::compute(&y, &p);
        assert_eq!(m.accuracy, Some(1.0));
        assert_eq!(m.auc, Some(1.0));
    }

    #[test]
    fn test_random_scores_auc_half() {
        let y = array![0.0, 1.0, 0.0, 1.0];
        let p = array![0.5, 0.5, 0.5, 0.5];
        let m = EvalMetrics::compute(&y, &p);
        assert_eq!(m.auc, Some(0.5));
    }

    #[test]
    fn test_single_class_has_no_auc() {
        let y = array![1.0, 1.0, 1.0];
        let p = array![0.9, 0.8, 0.7];
        let m = EvalMetrics::compute(&y, &p);
        assert!(m.auc.is_none());
        assert_eq!(m.accuracy, Some(1.0));
    }

    #[test]
    fn test_empty_split() {
        let y = Array1::<f64>::zeros(0);
        let p = Array1::<f64>::zeros(0);
        let m = EvalMetrics::compute(&y, &p);
        assert_eq!(m.n_samples, 0);
        assert!(m.accuracy.is_none());
    }
}
