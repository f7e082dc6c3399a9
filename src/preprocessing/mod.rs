//! Fitted preprocessing for risk features
//!
//! Raw feature mappings are turned into the numeric matrix the estimator
//! expects: median imputation for numeric columns, ignore-unseen one-hot
//! encoding for low-cardinality or string columns. The pipeline is
//! positionally fit — feature order comes from the schema and is
//! load-bearing.

mod encoder;
mod imputer;
mod pipeline;

pub use encoder::OneHotEncoder;
pub use imputer::MedianImputer;
pub use pipeline::PreprocessPipeline;

use polars::prelude::*;

use crate::error::{Result, RiskError};

/// Columns with at most this many distinct values are treated as
/// categorical even when numerically typed.
pub const MAX_CATEGORICAL_CARDINALITY: usize = 10;

/// Column role decided at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColumnType {
    Numeric,
    Categorical,
}

/// Decide the role of one column: categorical if string-typed or if its
/// cardinality is at or below [`MAX_CATEGORICAL_CARDINALITY`].
pub fn column_type(df: &DataFrame, name: &str) -> Result<ColumnType> {
    let column = df
        .column(name)
        .map_err(|e| RiskError::Data(e.to_string()))?;
    let series = column.as_materialized_series();

    if matches!(series.dtype(), DataType::String | DataType::Categorical(_, _)) {
        return Ok(ColumnType::Categorical);
    }

    let distinct = series
        .n_unique()
        .map_err(|e| RiskError::Data(e.to_string()))?;
    // Nulls count toward n_unique; exclude them from the cardinality check.
    let distinct = distinct.saturating_sub(usize::from(series.null_count() > 0));
    if distinct <= MAX_CATEGORICAL_CARDINALITY {
        Ok(ColumnType::Categorical)
    } else {
        Ok(ColumnType::Numeric)
    }
}

/// Render a numeric value as a category token. Integral values drop the
/// decimal point so the vocabulary built at fit time matches coerced
/// request values exactly ("2", never "2.0").
pub fn category_token(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Extract a column as optional numeric values.
pub(crate) fn column_numeric(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|e| RiskError::Data(e.to_string()))?;
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|e| RiskError::Data(e.to_string()))?;
    let ca = casted.f64().map_err(|e| RiskError::Data(e.to_string()))?;
    Ok(ca
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Extract a column as category tokens; nulls become the empty token,
/// which no fitted vocabulary contains.
pub(crate) fn column_tokens(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .map_err(|e| RiskError::Data(e.to_string()))?;
    let series = column.as_materialized_series();

    if let Ok(ca) = series.str() {
        return Ok(ca
            .into_iter()
            .map(|v| v.map(|s| s.trim().to_string()).unwrap_or_default())
            .collect());
    }

    let values = column_numeric(df, name)?;
    Ok(values
        .into_iter()
        .map(|v| v.map(category_token).unwrap_or_default())
        .collect())
}
