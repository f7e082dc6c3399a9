//! Preprocessing pipeline binding imputer and encoder to a feature order

use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    column_numeric, column_tokens, column_type, category_token, ColumnType, MedianImputer,
    OneHotEncoder,
};
use crate::error::{Result, RiskError};
use crate::validator::FeatureValue;

/// Fitted preprocessing transform for one disease key.
///
/// The output layout is positional: slots follow the schema feature order,
/// one slot per numeric feature, one block of one-hot slots per categorical
/// feature. Fit once at training time, stateless at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessPipeline {
    feature_order: Vec<String>,
    roles: Vec<ColumnType>,
    imputer: MedianImputer,
    encoder: OneHotEncoder,
    is_fitted: bool,
}

impl PreprocessPipeline {
    pub fn new() -> Self {
        Self {
            feature_order: Vec::new(),
            roles: Vec::new(),
            imputer: MedianImputer::new(),
            encoder: OneHotEncoder::new(),
            is_fitted: false,
        }
    }

    /// Fit the pipeline on the training frame, using `features` in the
    /// exact order the schema will record.
    pub fn fit(&mut self, df: &DataFrame, features: &[String]) -> Result<&mut Self> {
        self.feature_order = features.to_vec();
        self.roles = features
            .iter()
            .map(|name| column_type(df, name))
            .collect::<Result<Vec<_>>>()?;

        let numeric: Vec<String> = self.columns_of(ColumnType::Numeric);
        let categorical: Vec<String> = self.columns_of(ColumnType::Categorical);

        self.imputer.fit(df, &numeric)?;
        self.encoder.fit(df, &categorical)?;
        self.is_fitted = true;
        Ok(self)
    }

    /// Ordered feature names this pipeline was fit with.
    pub fn feature_order(&self) -> &[String] {
        &self.feature_order
    }

    /// Width of the numeric matrix this pipeline produces.
    pub fn output_dim(&self) -> Result<usize> {
        if !self.is_fitted {
            return Err(RiskError::ModelNotFitted);
        }
        let mut dim = 0;
        for (name, role) in self.feature_order.iter().zip(&self.roles) {
            dim += match role {
                ColumnType::Numeric => 1,
                ColumnType::Categorical => self.encoder.width(name)?,
            };
        }
        Ok(dim)
    }

    /// Transform a whole frame into the training matrix.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(RiskError::ModelNotFitted);
        }
        let n_rows = df.height();
        let dim = self.output_dim()?;
        let mut out = Array2::zeros((n_rows, dim));

        let mut offset = 0;
        for (name, role) in self.feature_order.iter().zip(&self.roles) {
            match role {
                ColumnType::Numeric => {
                    let filled = self.imputer.fill(name, &column_numeric(df, name)?)?;
                    for (i, v) in filled.into_iter().enumerate() {
                        out[[i, offset]] = v;
                    }
                    offset += 1;
                }
                ColumnType::Categorical => {
                    let width = self.encoder.width(name)?;
                    for (i, token) in column_tokens(df, name)?.iter().enumerate() {
                        let block = self.encoder.encode(name, token)?;
                        for (j, v) in block.into_iter().enumerate() {
                            out[[i, offset + j]] = v;
                        }
                    }
                    offset += width;
                }
            }
        }
        Ok(out)
    }

    /// Transform one coerced row (already in schema feature order) into a
    /// 1×d matrix for the estimator.
    pub fn transform_row(&self, row: &[FeatureValue]) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(RiskError::ModelNotFitted);
        }
        if row.len() != self.feature_order.len() {
            return Err(RiskError::Shape {
                expected: format!("{} features", self.feature_order.len()),
                actual: format!("{} features", row.len()),
            });
        }

        let mut slots = Vec::with_capacity(self.output_dim()?);
        for ((name, role), value) in self.feature_order.iter().zip(&self.roles).zip(row) {
            match role {
                ColumnType::Numeric => slots.push(self.numeric_slot(name, value)?),
                ColumnType::Categorical => {
                    let token = Self::token_of(value);
                    slots.extend(self.encoder.encode(name, &token)?);
                }
            }
        }

        let dim = slots.len();
        Array2::from_shape_vec((1, dim), slots)
            .map_err(|e| RiskError::Data(format!("Row assembly failed: {e}")))
    }

    fn numeric_slot(&self, name: &str, value: &FeatureValue) -> Result<f64> {
        let median = self.imputer.median_for(name)?;
        Ok(match value {
            FeatureValue::Number(v) => *v,
            FeatureValue::Text(s) => s.parse::<f64>().unwrap_or(median),
            FeatureValue::Missing => median,
        })
    }

    fn token_of(value: &FeatureValue) -> String {
        match value {
            FeatureValue::Number(v) => category_token(*v),
            FeatureValue::Text(s) => s.clone(),
            FeatureValue::Missing => String::new(),
        }
    }

    fn columns_of(&self, wanted: ColumnType) -> Vec<String> {
        self.feature_order
            .iter()
            .zip(&self.roles)
            .filter(|(_, role)| **role == wanted)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Default for PreprocessPipeline {
    fn default() -> Self {
        Self::new()
    }
}
