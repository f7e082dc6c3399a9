//! Batch training pipeline behavior

use polars::prelude::*;
use std::collections::HashMap;

use prognos::model::GbmConfig;
use prognos::predictor::RiskEngine;
use prognos::registry::ModelRegistry;
use prognos::schema::SchemaStore;
use prognos::training::{Trainer, TrainingConfig};
use prognos::validator::RawFeatures;

fn small_config() -> TrainingConfig {
    TrainingConfig {
        gbm: GbmConfig {
            n_estimators: 10,
            max_depth: 3,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Full synthetic survey table carrying every default feature and label
/// column. Outcomes depend on different feature mixes so each model has
/// signal to fit.
fn full_source_frame(n: usize) -> DataFrame {
    let age: Vec<f64> = (0..n).map(|i| 20.0 + (i * 7 % 60) as f64).collect();
    let sex: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "M" } else { "F" }).collect();
    let bmi: Vec<f64> = (0..n).map(|i| 18.0 + (i * 13 % 25) as f64).collect();
    let waist: Vec<f64> = (0..n).map(|i| 70.0 + (i * 11 % 50) as f64).collect();
    let sbp: Vec<f64> = (0..n).map(|i| 100.0 + (i * 17 % 70) as f64).collect();
    let dbp: Vec<f64> = (0..n).map(|i| 60.0 + (i * 5 % 40) as f64).collect();
    let tc: Vec<f64> = (0..n).map(|i| 140.0 + (i * 19 % 120) as f64).collect();
    let hdl: Vec<f64> = (0..n).map(|i| 30.0 + (i * 3 % 50) as f64).collect();
    let glucose: Vec<f64> = (0..n).map(|i| 70.0 + (i * 23 % 130) as f64).collect();
    let smoker: Vec<f64> = (0..n).map(|i| if i % 3 == 0 { 1.0 } else { 2.0 }).collect();
    let alcohol: Vec<f64> = (0..n).map(|i| if i % 4 == 0 { 1.0 } else { 2.0 }).collect();
    let activity: Vec<f64> = (0..n).map(|i| (i % 3 + 1) as f64).collect();
    let family: Vec<f64> = (0..n).map(|i| if i % 5 == 0 { 1.0 } else { 2.0 }).collect();

    let yes_no = |flag: bool| if flag { 1.0 } else { 2.0 };
    let diabetes: Vec<f64> = (0..n).map(|i| yes_no(glucose[i] > 140.0)).collect();
    let liver: Vec<f64> = (0..n).map(|i| yes_no(alcohol[i] == 1.0 && bmi[i] > 30.0)).collect();
    let kidney: Vec<f64> = (0..n).map(|i| yes_no(sbp[i] > 150.0 && age[i] > 50.0)).collect();
    let chf: Vec<f64> = (0..n).map(|i| yes_no(age[i] > 65.0 && sbp[i] > 140.0)).collect();
    let chd: Vec<f64> = (0..n).map(|i| yes_no(tc[i] > 230.0 && hdl[i] < 45.0)).collect();
    let attack: Vec<f64> = (0..n).map(|i| yes_no(smoker[i] == 1.0 && age[i] > 55.0)).collect();
    let stroke: Vec<f64> = (0..n).map(|i| yes_no(sbp[i] > 160.0)).collect();

    DataFrame::new(vec![
        Column::new("age".into(), age),
        Column::new("sex".into(), sex),
        Column::new("bmi".into(), bmi),
        Column::new("waist_circumference".into(), waist),
        Column::new("systolic_bp".into(), sbp),
        Column::new("diastolic_bp".into(), dbp),
        Column::new("total_cholesterol".into(), tc),
        Column::new("hdl_cholesterol".into(), hdl),
        Column::new("glucose".into(), glucose),
        Column::new("smoker".into(), smoker),
        Column::new("alcohol_use".into(), alcohol),
        Column::new("physical_activity".into(), activity),
        Column::new("family_history".into(), family),
        Column::new("diabetes_dx".into(), diabetes),
        Column::new("liver_condition_dx".into(), liver),
        Column::new("kidney_failing_dx".into(), kidney),
        Column::new("chf_dx".into(), chf),
        Column::new("chd_dx".into(), chd),
        Column::new("heart_attack_dx".into(), attack),
        Column::new("stroke_dx".into(), stroke),
    ])
    .unwrap()
}

fn all_feature_values() -> RawFeatures {
    [
        ("age", "67"),
        ("sex", "F"),
        ("bmi", "33"),
        ("waist_circumference", "102"),
        ("systolic_bp", "165"),
        ("diastolic_bp", "95"),
        ("total_cholesterol", "250"),
        ("hdl_cholesterol", "38"),
        ("glucose", "180"),
        ("smoker", "1"),
        ("alcohol_use", "1"),
        ("physical_activity", "1"),
        ("family_history", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[test]
fn test_batch_fits_all_default_targets() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = Trainer::new(dir.path()).with_config(small_config());
    let report = trainer.train_all(&full_source_frame(300)).unwrap();

    assert_eq!(report.fitted.len(), 4, "failed: {:?}", report.failed);
    assert!(report.failed.is_empty());

    let schema = SchemaStore::new(dir.path()).load().unwrap();
    let mut keys = schema.disease_keys();
    keys.sort();
    assert_eq!(
        keys,
        vec!["CVD", "Diabetes", "Liver Condition", "Weak/Failing Kidney"]
    );
    assert_eq!(
        schema.components_for("CVD").unwrap(),
        &[
            "Congestive Heart Failure".to_string(),
            "Coronary Heart Disease".to_string(),
            "Heart Attack".to_string(),
            "Stroke".to_string()
        ]
    );

    // Artifact pair exists per key, with normalized names.
    for stem in [
        "CVD",
        "Diabetes",
        "Liver_Condition",
        "Weak_Failing_Kidney",
    ] {
        assert!(dir.path().join(format!("{stem}.preproc.bin")).exists());
        assert!(dir.path().join(format!("{stem}.model.bin")).exists());
    }
}

#[test]
fn test_trained_models_predict_in_unit_interval() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = Trainer::new(dir.path()).with_config(small_config());
    trainer.train_all(&full_source_frame(300)).unwrap();

    let engine = RiskEngine::new(ModelRegistry::open(dir.path()).unwrap());
    let features = all_feature_values();
    for key in engine.list_models() {
        let risk = engine.predict_risk(&key, &features).unwrap();
        assert!((0.0..=1.0).contains(&risk), "{key}: risk {risk} out of range");
    }
}

#[test]
fn test_failed_target_does_not_abort_batch() {
    let dir = tempfile::tempdir().unwrap();
    let df = full_source_frame(300)
        .drop("liver_condition_dx")
        .unwrap();

    let trainer = Trainer::new(dir.path()).with_config(small_config());
    let report = trainer.train_all(&df).unwrap();

    assert_eq!(report.fitted.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "Liver Condition");

    // The failed target never reaches the schema.
    let schema = SchemaStore::new(dir.path()).load().unwrap();
    assert!(schema.features_for("Liver Condition").is_none());
    assert!(schema.features_for("Diabetes").is_some());
}

#[test]
fn test_retraining_replaces_schema_wholesale() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = Trainer::new(dir.path()).with_config(small_config());
    trainer.train_all(&full_source_frame(300)).unwrap();

    // Second run without one label column: its key must disappear from the
    // fresh schema document.
    let df = full_source_frame(300).drop("kidney_failing_dx").unwrap();
    trainer.train_all(&df).unwrap();

    let schema = SchemaStore::new(dir.path()).load().unwrap();
    assert!(schema.features_for("Weak/Failing Kidney").is_none());
}

#[test]
fn test_composite_requires_all_component_labels() {
    let dir = tempfile::tempdir().unwrap();
    let df = full_source_frame(300).drop("stroke_dx").unwrap();

    let trainer = Trainer::new(dir.path()).with_config(small_config());
    let report = trainer.train_all(&df).unwrap();

    assert!(report.failed.iter().any(|(key, _)| key == "CVD"));
    let schema = SchemaStore::new(dir.path()).load().unwrap();
    assert!(schema.components_for("CVD").is_none());
}

#[test]
fn test_majority_missing_feature_excluded_from_schema() {
    let dir = tempfile::tempdir().unwrap();
    let mut df = full_source_frame(300);
    let n = df.height();
    // Make glucose majority-missing.
    let sparse: Vec<Option<f64>> = (0..n).map(|i| if i < 20 { Some(100.0) } else { None }).collect();
    df.replace("glucose", Series::new("glucose".into(), sparse))
        .unwrap();

    let trainer = Trainer::new(dir.path()).with_config(small_config());
    trainer.train_all(&df).unwrap();

    let schema = SchemaStore::new(dir.path()).load().unwrap();
    let features = schema.features_for("Diabetes").unwrap();
    assert!(!features.contains(&"glucose".to_string()));
    assert!(features.contains(&"age".to_string()));

    // Prediction no longer requires the dropped feature.
    let engine = RiskEngine::new(ModelRegistry::open(dir.path()).unwrap());
    let mut features = all_feature_values();
    features.remove("glucose");
    assert!(engine.predict_risk("Diabetes", &features).is_ok());
}

#[test]
fn test_training_is_deterministic() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let df = full_source_frame(300);

    Trainer::new(dir_a.path())
        .with_config(small_config())
        .train_all(&df)
        .unwrap();
    Trainer::new(dir_b.path())
        .with_config(small_config())
        .train_all(&df)
        .unwrap();

    let engine_a = RiskEngine::new(ModelRegistry::open(dir_a.path()).unwrap());
    let engine_b = RiskEngine::new(ModelRegistry::open(dir_b.path()).unwrap());
    let features = all_feature_values();
    for key in engine_a.list_models() {
        assert_eq!(
            engine_a.predict_risk(&key, &features).unwrap(),
            engine_b.predict_risk(&key, &features).unwrap(),
            "{key} differs between identical runs"
        );
    }
}
