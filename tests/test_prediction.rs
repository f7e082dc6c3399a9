//! End-to-end prediction properties

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array1;
use polars::prelude::*;

use prognos::model::{GbmConfig, ModelArtifact, OneVsRestClassifier};
use prognos::predictor::RiskEngine;
use prognos::preprocessing::PreprocessPipeline;
use prognos::registry::{save_artifacts, ArtifactStore, FsStore, ModelRegistry};
use prognos::schema::{FeatureSchema, SchemaStore};
use prognos::training::{TargetSpec, Trainer, TrainingConfig};
use prognos::validator::RawFeatures;
use prognos::RiskError;

fn small_config() -> TrainingConfig {
    TrainingConfig {
        gbm: GbmConfig {
            n_estimators: 12,
            max_depth: 3,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Deterministic synthetic survey table: age drives the outcome, with
/// 1=yes/2=no label coding and a few invalid codes mixed in.
fn source_frame(n: usize) -> DataFrame {
    let age: Vec<f64> = (0..n).map(|i| 20.0 + (i * 7 % 60) as f64).collect();
    let sex: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "M" } else { "F" }).collect();
    let bmi: Vec<f64> = (0..n).map(|i| 18.0 + (i * 13 % 25) as f64).collect();
    let smoker: Vec<f64> = (0..n).map(|i| if i % 3 == 0 { 1.0 } else { 2.0 }).collect();
    let diabetes: Vec<f64> = (0..n)
        .map(|i| {
            if i % 17 == 0 {
                9.0 // refused / don't know: row dropped for this target
            } else if age[i] + bmi[i] > 70.0 {
                1.0
            } else {
                2.0
            }
        })
        .collect();
    DataFrame::new(vec![
        Column::new("age".into(), age),
        Column::new("sex".into(), sex),
        Column::new("bmi".into(), bmi),
        Column::new("smoker".into(), smoker),
        Column::new("diabetes_dx".into(), diabetes),
    ])
    .unwrap()
}

fn diabetes_spec() -> TargetSpec {
    TargetSpec {
        key: "Diabetes".to_string(),
        target_column: "diabetes_dx".to_string(),
        features: vec!["age".into(), "sex".into(), "bmi".into(), "smoker".into()],
        mandated: vec![],
    }
}

fn train_diabetes(dir: &Path) -> RiskEngine {
    let trainer = Trainer::new(dir).with_config(small_config());
    let mut schema = FeatureSchema::default();
    trainer
        .fit_single(&source_frame(240), &diabetes_spec(), &mut schema)
        .unwrap();
    SchemaStore::new(dir).save(&schema).unwrap();
    RiskEngine::new(ModelRegistry::open(dir).unwrap())
}

fn valid_features() -> RawFeatures {
    HashMap::from([
        ("age".to_string(), "63".to_string()),
        ("sex".to_string(), "M".to_string()),
        ("bmi".to_string(), "31.5".to_string()),
        ("smoker".to_string(), "1".to_string()),
    ])
}

#[test]
fn test_expected_features_match_training_run() {
    let dir = tempfile::tempdir().unwrap();
    let engine = train_diabetes(dir.path());

    let features = engine.expected_features("Diabetes").unwrap();
    assert_eq!(
        features,
        vec![
            "age".to_string(),
            "sex".to_string(),
            "bmi".to_string(),
            "smoker".to_string()
        ]
    );
}

#[test]
fn test_risk_in_unit_interval() {
    let dir = tempfile::tempdir().unwrap();
    let engine = train_diabetes(dir.path());

    let risk = engine.predict_risk("Diabetes", &valid_features()).unwrap();
    assert!((0.0..=1.0).contains(&risk), "risk {risk} out of range");
}

#[test]
fn test_prediction_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = train_diabetes(dir.path());

    let first = engine.predict_risk("Diabetes", &valid_features()).unwrap();
    let second = engine.predict_risk("Diabetes", &valid_features()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_empty_input_lists_every_feature() {
    let dir = tempfile::tempdir().unwrap();
    let engine = train_diabetes(dir.path());

    let err = engine
        .predict_risk("Diabetes", &RawFeatures::new())
        .unwrap_err();
    match err {
        RiskError::MissingFeatures(names) => {
            assert_eq!(names.len(), 4);
            assert!(names.contains(&"age".to_string()));
            assert!(names.contains(&"smoker".to_string()));
        }
        other => panic!("expected MissingFeatures, got {other:?}"),
    }
}

#[test]
fn test_unknown_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = train_diabetes(dir.path());

    let err = engine
        .predict_risk("no-such-key", &valid_features())
        .unwrap_err();
    assert!(matches!(err, RiskError::UnknownDiseaseKey(_)));
}

#[test]
fn test_missing_value_imputed_not_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = train_diabetes(dir.path());

    let mut features = valid_features();
    features.insert("bmi".to_string(), String::new());
    let risk = engine.predict_risk("Diabetes", &features).unwrap();
    assert!((0.0..=1.0).contains(&risk));
}

#[test]
fn test_extra_keys_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let engine = train_diabetes(dir.path());

    let mut features = valid_features();
    features.insert("unrelated".to_string(), "anything".to_string());
    assert!(engine.predict_risk("Diabetes", &features).is_ok());
}

/// Composite aggregation: with an uninformative (constant) feature each
/// component's probability collapses to its training prevalence, so the
/// aggregate must be the maximum component prevalence.
#[test]
fn test_composite_risk_is_max_component() {
    let dir = tempfile::tempdir().unwrap();
    let n = 100;

    let age: Vec<f64> = vec![50.0; n];
    let frame = DataFrame::new(vec![Column::new("age".into(), age)]).unwrap();
    let mut pipeline = PreprocessPipeline::new();
    pipeline.fit(&frame, &["age".to_string()]).unwrap();
    let x = pipeline.transform(&frame).unwrap();

    let prevalences = [0.1, 0.9, 0.3, 0.05];
    let targets: Vec<Array1<f64>> = prevalences
        .iter()
        .map(|p| {
            let positives = (p * n as f64).round() as usize;
            (0..n)
                .map(|i| if i < positives { 1.0 } else { 0.0 })
                .collect()
        })
        .collect();
    let components: Vec<String> = ["chf", "chd", "heart_attack", "stroke"]
        .into_iter()
        .map(String::from)
        .collect();

    // Full-sample boosting on a constant feature leaves every sub-model at
    // its base rate.
    let config = GbmConfig {
        n_estimators: 5,
        subsample: 1.0,
        colsample: 1.0,
        ..Default::default()
    };
    let ovr = OneVsRestClassifier::fit(&x, &targets, components.clone(), &config).unwrap();

    let store = FsStore;
    save_artifacts(
        &store,
        dir.path(),
        "CVD",
        &pipeline,
        &ModelArtifact::Composite(ovr),
    )
    .unwrap();
    let mut schema = FeatureSchema::default();
    schema.set_features("CVD", vec!["age".to_string()]);
    schema.set_components("CVD", components);
    SchemaStore::new(dir.path()).save(&schema).unwrap();

    let engine = RiskEngine::new(ModelRegistry::open(dir.path()).unwrap());
    let features = HashMap::from([("age".to_string(), "50".to_string())]);
    let risk = engine.predict_risk("CVD", &features).unwrap();
    assert!((risk - 0.9).abs() < 1e-9, "expected 0.9, got {risk}");
}

/// Storage backend that counts reads, for verifying single cache
/// population under concurrency.
struct CountingStore {
    inner: FsStore,
    reads: AtomicUsize,
}

impl ArtifactStore for CountingStore {
    fn read(&self, path: &Path) -> prognos::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> prognos::Result<()> {
        self.inner.write(path, bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }
}

#[test]
fn test_concurrent_first_loads_hit_storage_once() {
    let dir = tempfile::tempdir().unwrap();
    train_diabetes(dir.path());

    let store = Arc::new(CountingStore {
        inner: FsStore,
        reads: AtomicUsize::new(0),
    });
    let registry =
        ModelRegistry::with_store(dir.path(), Arc::clone(&store) as Arc<dyn ArtifactStore>)
            .unwrap();
    let engine = Arc::new(RiskEngine::new(registry));

    let results: Vec<f64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                scope.spawn(move || engine.predict_risk("Diabetes", &valid_features()).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // One artifact load = one read per file of the pair.
    assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    for risk in &results {
        assert_eq!(*risk, results[0]);
        assert!((0.0..=1.0).contains(risk));
    }
}
