//! Ranked capability cascade
//!
//! The dispatcher invokes an estimator through the highest-ranked
//! capability it declares and falls through to the next on failure:
//! probability, then score, then label. Only when every declared
//! capability raises does the cascade fail, wrapping the last underlying
//! error.

use ndarray::Array2;

use crate::error::{Result, RiskError};
use crate::model::{Capability, RiskModel};

/// Fixed capability rank order.
const CAPABILITY_RANK: &[Capability] =
    &[Capability::Probability, Capability::Score, Capability::Label];

fn clip01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Produce one risk score per estimator output for a single input row.
/// Single-outcome estimators yield one score; composites yield one per
/// component, aggregated by the caller.
pub fn component_risks(model: &dyn RiskModel, x: &Array2<f64>) -> Result<Vec<f64>> {
    let mut last_err = RiskError::Data("Estimator declares no prediction capability".into());

    for capability in CAPABILITY_RANK {
        if !model.capabilities().contains(capability) {
            continue;
        }
        match try_capability(model, *capability, x) {
            Ok(risks) => return Ok(risks),
            Err(e) => last_err = e,
        }
    }

    Err(RiskError::PredictionFailed(Box::new(last_err)))
}

fn try_capability(
    model: &dyn RiskModel,
    capability: Capability,
    x: &Array2<f64>,
) -> Result<Vec<f64>> {
    match capability {
        Capability::Probability => from_probabilities(&model.predict_proba(x)?, model.n_outputs()),
        Capability::Score => from_scores(&model.decision_score(x)?, model.n_outputs()),
        Capability::Label => from_labels(&model.predict_label(x)?),
    }
}

/// Probability capability. Composite estimators return one positive-class
/// probability per component. Single-outcome estimators return class
/// columns: the positive class sits at index 1. That index-1 convention is
/// also applied when more than two classes are produced — a known
/// limitation carried deliberately, not real multiclass support.
fn from_probabilities(proba: &Array2<f64>, n_outputs: usize) -> Result<Vec<f64>> {
    if proba.ncols() == 0 {
        return Err(RiskError::Data("Estimator produced no probabilities".into()));
    }
    let row = proba.row(0);
    if n_outputs > 1 {
        return Ok(row.iter().map(|&p| clip01(p)).collect());
    }
    let positive = if proba.ncols() >= 2 { row[1] } else { row[0] };
    Ok(vec![clip01(positive)])
}

/// Score capability: logistic transform for a single score, row-wise
/// softmax for multiple class scores, per-component logistic for
/// composites.
fn from_scores(scores: &Array2<f64>, n_outputs: usize) -> Result<Vec<f64>> {
    if scores.ncols() == 0 {
        return Err(RiskError::Data("Estimator produced no scores".into()));
    }
    let row = scores.row(0);
    if n_outputs > 1 {
        return Ok(row.iter().map(|&s| clip01(logistic(s))).collect());
    }
    if scores.ncols() == 1 {
        return Ok(vec![clip01(logistic(row[0]))]);
    }
    let soft = softmax(&row.to_vec());
    Ok(vec![clip01(soft[1])])
}

/// Label capability: the raw predicted label used directly as probability.
fn from_labels(labels: &Array2<f64>) -> Result<Vec<f64>> {
    if labels.ncols() == 0 {
        return Err(RiskError::Data("Estimator produced no labels".into()));
    }
    Ok(labels.row(0).iter().map(|&v| clip01(v)).collect())
}

fn logistic(score: f64) -> f64 {
    1.0 / (1.0 + (-score).exp())
}

fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
