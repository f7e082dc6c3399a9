//! Ignore-unseen one-hot encoding for categorical columns

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::column_tokens;
use crate::error::{Result, RiskError};

/// One-hot encoder with a fixed per-column vocabulary. Tokens not seen
/// during fit encode as an all-zero block instead of failing, so requests
/// carrying novel category levels still produce a prediction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneHotEncoder {
    /// Sorted category vocabulary per column.
    categories: BTreeMap<String, Vec<String>>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the vocabulary for the given columns. Empty tokens (missing
    /// values) are excluded, so they later encode as all-zero.
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        self.categories.clear();
        for name in columns {
            let mut seen: Vec<String> = column_tokens(df, name)?
                .into_iter()
                .filter(|t| !t.is_empty())
                .collect();
            seen.sort();
            seen.dedup();
            self.categories.insert(name.clone(), seen);
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Number of one-hot slots a fitted column occupies.
    pub fn width(&self, name: &str) -> Result<usize> {
        self.vocabulary(name).map(|v| v.len())
    }

    /// Encode one token into its one-hot block. Unseen tokens yield all
    /// zeros.
    pub fn encode(&self, name: &str, token: &str) -> Result<Vec<f64>> {
        let vocabulary = self.vocabulary(name)?;
        let mut block = vec![0.0; vocabulary.len()];
        if let Ok(idx) = vocabulary.binary_search(&token.to_string()) {
            block[idx] = 1.0;
        }
        Ok(block)
    }

    fn vocabulary(&self, name: &str) -> Result<&Vec<String>> {
        if !self.is_fitted {
            return Err(RiskError::ModelNotFitted);
        }
        self.categories
            .get(name)
            .ok_or_else(|| RiskError::Data(format!("No vocabulary for column '{name}'")))
    }
}
