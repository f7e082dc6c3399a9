//! Feature validation and coercion
//!
//! Checks presence of all schema-required inputs and coerces raw values
//! into the numeric/categorical shape the preprocessing pipeline expects.
//! Coercion must exactly mirror the type contract used when the pipeline
//! was fit: absent or empty values become a missing-value sentinel handled
//! by imputation downstream, everything else is tried as a number first and
//! falls back to a categorical string.

use std::collections::HashMap;

use crate::error::{Result, RiskError};

/// Raw feature mapping as handed over by the serving layer.
pub type RawFeatures = HashMap<String, String>;

/// A coerced feature value.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FeatureValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }
}

/// Coerce one raw value.
pub fn coerce(raw: &str) -> FeatureValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return FeatureValue::Missing;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => FeatureValue::Number(v),
        _ => FeatureValue::Text(trimmed.to_string()),
    }
}

/// Fail with `MissingFeatures` naming every schema-required feature absent
/// from the input. Unexpected extra keys are ignored, not rejected.
pub fn validate(expected: &[String], raw: &RawFeatures) -> Result<()> {
    let missing: Vec<String> = expected
        .iter()
        .filter(|name| !raw.contains_key(*name))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RiskError::MissingFeatures(missing))
    }
}

/// Build a single coerced row following the schema's feature order.
/// Callers must `validate` first; a key that is still absent here coerces
/// to `Missing` rather than panicking.
pub fn coerce_row(expected: &[String], raw: &RawFeatures) -> Vec<FeatureValue> {
    expected
        .iter()
        .map(|name| match raw.get(name) {
            Some(value) => coerce(value),
            None => FeatureValue::Missing,
        })
        .collect()
}
