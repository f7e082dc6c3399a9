//! Median imputation for numeric columns

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::column_numeric;
use crate::error::{Result, RiskError};

/// Median imputer fit per numeric column. Missing values at transform time
/// are replaced with the median observed during fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: BTreeMap<String, f64>,
    is_fitted: bool,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit medians for the given columns.
    pub fn fit(&mut self, df: &DataFrame, columns: &[String]) -> Result<&mut Self> {
        self.medians.clear();
        for name in columns {
            let mut values: Vec<f64> = column_numeric(df, name)?.into_iter().flatten().collect();
            let median = if values.is_empty() {
                0.0
            } else {
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                }
            };
            self.medians.insert(name.clone(), median);
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Median for one fitted column.
    pub fn median_for(&self, name: &str) -> Result<f64> {
        if !self.is_fitted {
            return Err(RiskError::ModelNotFitted);
        }
        self.medians
            .get(name)
            .copied()
            .ok_or_else(|| RiskError::Data(format!("No imputation value for column '{name}'")))
    }

    /// Replace missing entries of a fitted column with its median.
    pub fn fill(&self, name: &str, values: &[Option<f64>]) -> Result<Vec<f64>> {
        let median = self.median_for(name)?;
        Ok(values.iter().map(|v| v.unwrap_or(median)).collect())
    }
}
