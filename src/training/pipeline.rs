//! Batch fitting of per-disease artifact pairs

use chrono::{DateTime, Utc};
use ndarray::Array1;
use polars::prelude::*;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::metrics::EvalMetrics;
use super::{
    default_composite, default_targets, CompositeSpec, TargetSpec, TrainingConfig, RAW_NEGATIVE,
    RAW_POSITIVE,
};
use crate::error::{Result, RiskError};
use crate::model::{GbmClassifier, ModelArtifact, OneVsRestClassifier, RiskModel};
use crate::preprocessing::{column_numeric, PreprocessPipeline};
use crate::registry::{save_artifacts, ArtifactStore, FsStore};
use crate::schema::{FeatureSchema, SchemaStore};

/// Outcome of one fitted target.
#[derive(Debug, Clone)]
pub struct FitReport {
    pub key: String,
    pub n_rows: usize,
    pub features: Vec<String>,
    pub metrics: EvalMetrics,
    pub trained_at: DateTime<Utc>,
}

/// Outcome of a whole batch run. A failed target never aborts the batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub fitted: Vec<FitReport>,
    pub failed: Vec<(String, String)>,
}

/// Offline trainer bound to one model directory.
pub struct Trainer {
    model_dir: PathBuf,
    config: TrainingConfig,
    store: Arc<dyn ArtifactStore>,
}

impl Trainer {
    pub fn new(model_dir: impl AsRef<Path>) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            config: TrainingConfig::default(),
            store: Arc::new(FsStore),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    /// Fit one single-outcome target and persist its artifact pair. The
    /// realized feature list is recorded into `schema`; the caller saves
    /// the schema document once per batch.
    pub fn fit_single(
        &self,
        df: &DataFrame,
        spec: &TargetSpec,
        schema: &mut FeatureSchema,
    ) -> Result<FitReport> {
        let labels = column_numeric(df, &spec.target_column)?;
        let valid = valid_label_mask(&[labels.clone()]);
        let kept = filter_rows(df, &valid)?;
        if kept.height() == 0 {
            return Err(RiskError::TrainingConfiguration(format!(
                "No rows with a valid '{}' label for target '{}'",
                spec.target_column, spec.key
            )));
        }

        let y = remap_labels(&column_numeric(&kept, &spec.target_column)?);
        let features = self.select_features(&kept, &spec.key, &spec.features, &spec.mandated)?;

        let (train_df, eval_df) = self.split(&kept)?;
        let mut pipeline = PreprocessPipeline::new();
        pipeline.fit(&train_df, &features)?;

        let (train_idx, eval_idx) = self.split_indices(kept.height());
        let y_train: Array1<f64> = train_idx.iter().map(|&i| y[i]).collect();
        let y_eval: Array1<f64> = eval_idx.iter().map(|&i| y[i]).collect();

        let x_train = pipeline.transform(&train_df)?;
        let mut gbm = GbmClassifier::new(self.config.gbm.clone());
        gbm.fit(&x_train, &y_train)?;

        let metrics = if eval_df.height() > 0 {
            let x_eval = pipeline.transform(&eval_df)?;
            EvalMetrics::compute(&y_eval, &gbm.positive_probability(&x_eval)?)
        } else {
            EvalMetrics::empty()
        };

        let artifact = ModelArtifact::Single(gbm);
        save_artifacts(
            self.store.as_ref(),
            &self.model_dir,
            &spec.key,
            &pipeline,
            &artifact,
        )?;
        schema.set_features(spec.key.clone(), features.clone());

        info!(
            key = %spec.key,
            rows = kept.height(),
            features = features.len(),
            accuracy = ?metrics.accuracy,
            auc = ?metrics.auc,
            "fitted single-outcome model"
        );

        Ok(FitReport {
            key: spec.key.clone(),
            n_rows: kept.height(),
            features,
            metrics,
            trained_at: Utc::now(),
        })
    }

    /// Fit the composite target: rows are kept only when every component
    /// label is valid, and each component gets an independent sub-model.
    pub fn fit_composite(
        &self,
        df: &DataFrame,
        spec: &CompositeSpec,
        schema: &mut FeatureSchema,
    ) -> Result<FitReport> {
        let raw_labels: Vec<Vec<Option<f64>>> = spec
            .components
            .iter()
            .map(|c| column_numeric(df, &c.column))
            .collect::<Result<_>>()?;
        let valid = valid_label_mask(&raw_labels);
        let kept = filter_rows(df, &valid)?;
        if kept.height() == 0 {
            return Err(RiskError::TrainingConfiguration(format!(
                "No rows where all {} component labels are valid for '{}'",
                spec.components.len(),
                spec.key
            )));
        }

        let targets: Vec<Array1<f64>> = spec
            .components
            .iter()
            .map(|c| Ok(remap_labels(&column_numeric(&kept, &c.column)?)))
            .collect::<Result<_>>()?;

        let features = self.select_features(&kept, &spec.key, &spec.features, &spec.mandated)?;

        let (train_df, eval_df) = self.split(&kept)?;
        let mut pipeline = PreprocessPipeline::new();
        pipeline.fit(&train_df, &features)?;

        let (train_idx, eval_idx) = self.split_indices(kept.height());
        let train_targets: Vec<Array1<f64>> = targets
            .iter()
            .map(|t| train_idx.iter().map(|&i| t[i]).collect())
            .collect();

        let x_train = pipeline.transform(&train_df)?;
        let components: Vec<String> =
            spec.components.iter().map(|c| c.name.clone()).collect();
        let ovr = OneVsRestClassifier::fit(
            &x_train,
            &train_targets,
            components.clone(),
            &self.config.gbm,
        )?;

        // Evaluate the conservative aggregate: any component positive vs
        // the maximum component probability.
        let metrics = if eval_df.height() > 0 {
            let x_eval = pipeline.transform(&eval_df)?;
            let proba = ovr.predict_proba(&x_eval)?;
            let p_max: Array1<f64> = proba
                .rows()
                .into_iter()
                .map(|r| r.iter().copied().fold(0.0, f64::max))
                .collect();
            let y_any: Array1<f64> = eval_idx
                .iter()
                .map(|&i| {
                    targets
                        .iter()
                        .map(|t| t[i])
                        .fold(0.0, f64::max)
                })
                .collect();
            EvalMetrics::compute(&y_any, &p_max)
        } else {
            EvalMetrics::empty()
        };

        let artifact = ModelArtifact::Composite(ovr);
        save_artifacts(
            self.store.as_ref(),
            &self.model_dir,
            &spec.key,
            &pipeline,
            &artifact,
        )?;
        schema.set_features(spec.key.clone(), features.clone());
        schema.set_components(spec.key.clone(), components);

        info!(
            key = %spec.key,
            rows = kept.height(),
            components = spec.components.len(),
            accuracy = ?metrics.accuracy,
            auc = ?metrics.auc,
            "fitted composite model"
        );

        Ok(FitReport {
            key: spec.key.clone(),
            n_rows: kept.height(),
            features,
            metrics,
            trained_at: Utc::now(),
        })
    }

    /// Run the default batch: every single-outcome target plus the
    /// composite. A failing target is logged and skipped; the batch
    /// continues and the schema is saved once at the end, replacing the
    /// previous document wholesale.
    pub fn train_all(&self, df: &DataFrame) -> Result<BatchReport> {
        let mut schema = FeatureSchema::default();
        let mut report = BatchReport::default();

        for spec in default_targets() {
            match self.fit_single(df, &spec, &mut schema) {
                Ok(fit) => report.fitted.push(fit),
                Err(e) => {
                    error!(key = %spec.key, error = %e, "target failed; continuing batch");
                    report.failed.push((spec.key.clone(), e.to_string()));
                }
            }
        }

        let composite = default_composite();
        match self.fit_composite(df, &composite, &mut schema) {
            Ok(fit) => report.fitted.push(fit),
            Err(e) => {
                error!(key = %composite.key, error = %e, "composite failed; continuing batch");
                report.failed.push((composite.key.clone(), e.to_string()));
            }
        }

        SchemaStore::new(&self.model_dir).save(&schema)?;
        info!(
            fitted = report.fitted.len(),
            failed = report.failed.len(),
            "training batch complete"
        );
        Ok(report)
    }

    /// Keep candidate features present in the frame that are not
    /// majority-missing (mandated features are always kept). Zero
    /// surviving features is a fatal configuration error for this target.
    fn select_features(
        &self,
        df: &DataFrame,
        key: &str,
        candidates: &[String],
        mandated: &[String],
    ) -> Result<Vec<String>> {
        let n = df.height().max(1);
        let mut kept = Vec::new();
        for name in candidates {
            let Ok(column) = df.column(name) else {
                warn!(key, feature = %name, "feature absent from source table; skipping");
                continue;
            };
            let missing_fraction = column.null_count() as f64 / n as f64;
            if missing_fraction > self.config.max_missing_fraction && !mandated.contains(name) {
                warn!(
                    key,
                    feature = %name,
                    missing_fraction,
                    "feature is majority-missing; dropping"
                );
                continue;
            }
            kept.push(name.clone());
        }

        if kept.is_empty() {
            return Err(RiskError::TrainingConfiguration(format!(
                "No usable features survived filtering for target '{key}'"
            )));
        }
        Ok(kept)
    }

    /// Deterministic seeded train/eval row split.
    fn split_indices(&self, n: usize) -> (Vec<usize>, Vec<usize>) {
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed);
        indices.shuffle(&mut rng);

        let n_eval = ((n as f64) * self.config.eval_fraction).floor() as usize;
        let n_eval = if n > 1 { n_eval.max(1).min(n - 1) } else { 0 };
        let eval = indices[..n_eval].to_vec();
        let train = indices[n_eval..].to_vec();
        (train, eval)
    }

    fn split(&self, df: &DataFrame) -> Result<(DataFrame, DataFrame)> {
        let (train_idx, eval_idx) = self.split_indices(df.height());
        Ok((take_rows(df, &train_idx)?, take_rows(df, &eval_idx)?))
    }
}

/// Rows where every label column carries a valid raw code.
fn valid_label_mask(label_columns: &[Vec<Option<f64>>]) -> Vec<bool> {
    let n = label_columns.first().map(|c| c.len()).unwrap_or(0);
    (0..n)
        .map(|i| {
            label_columns.iter().all(|col| {
                matches!(col[i], Some(v) if v == RAW_POSITIVE || v == RAW_NEGATIVE)
            })
        })
        .collect()
}

/// Remap valid raw codes to {1, 0}. Callers filter invalid rows first.
fn remap_labels(raw: &[Option<f64>]) -> Array1<f64> {
    raw.iter()
        .map(|v| match v {
            Some(v) if *v == RAW_POSITIVE => 1.0,
            _ => 0.0,
        })
        .collect()
}

fn filter_rows(df: &DataFrame, mask: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("mask".into(), mask);
    df.filter(&mask).map_err(|e| RiskError::Data(e.to_string()))
}

fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec("idx".into(), indices.iter().map(|&i| i as IdxSize).collect());
    df.take(&idx).map_err(|e| RiskError::Data(e.to_string()))
}

/// Batch entry point consumed by operator tooling: load the source table,
/// fit every default target, persist artifacts and schema under
/// `model_dir`.
pub fn train_and_save_all_models(source_table: &Path, model_dir: &Path) -> Result<BatchReport> {
    let file = File::open(source_table)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|e| RiskError::Data(e.to_string()))?;

    info!(
        source = %source_table.display(),
        rows = df.height(),
        columns = df.width(),
        "loaded training source table"
    );
    Trainer::new(model_dir).train_all(&df)
}
