//! Command-line interface for the offline tooling
//!
//! Training, migration, and inspection run out-of-band through this CLI;
//! the prediction path is exercised here only as a one-off operator check,
//! never as a serving loop.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use crate::migrate::migrate_model_dir;
use crate::predictor::RiskEngine;
use crate::registry::ModelRegistry;
use crate::training::train_and_save_all_models;
use crate::validator::RawFeatures;

#[derive(Parser)]
#[command(name = "prognos")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Clinical risk model registry and prediction engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit all disease models from a source table and write artifacts
    Train {
        /// Source table (CSV with header)
        #[arg(short, long)]
        data: PathBuf,

        /// Directory receiving schema and artifact files
        #[arg(short, long)]
        model_dir: PathBuf,
    },

    /// Re-serialize stored artifacts into the current encoding
    Migrate {
        /// Directory holding artifact files
        #[arg(short, long)]
        model_dir: PathBuf,
    },

    /// List disease keys and their expected features
    Models {
        #[arg(short, long)]
        model_dir: PathBuf,
    },

    /// One-off risk prediction for a single feature set
    Predict {
        #[arg(short, long)]
        model_dir: PathBuf,

        /// Disease key
        #[arg(short, long)]
        key: String,

        /// Features as name=value pairs
        #[arg(short, long, value_parser = parse_feature)]
        feature: Vec<(String, String)>,
    },
}

fn parse_feature(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) => Ok((name.trim().to_string(), value.trim().to_string())),
        None => Err(format!("expected name=value, got '{raw}'")),
    }
}

fn step_ok(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

pub fn cmd_train(data: &PathBuf, model_dir: &PathBuf) -> anyhow::Result<()> {
    let report = train_and_save_all_models(data, model_dir)?;
    for fit in &report.fitted {
        step_ok(&format!(
            "{}  rows={} features={} accuracy={} auc={}",
            fit.key.bold(),
            fit.n_rows,
            fit.features.len(),
            fit.metrics
                .accuracy
                .map(|v| format!("{v:.3}"))
                .unwrap_or_else(|| "-".into()),
            fit.metrics
                .auc
                .map(|v| format!("{v:.3}"))
                .unwrap_or_else(|| "-".into()),
        ));
    }
    for (key, reason) in &report.failed {
        println!("  {} {}  {}", "✗".red(), key.bold(), reason.dimmed());
    }
    Ok(())
}

pub fn cmd_migrate(model_dir: &PathBuf) -> anyhow::Result<()> {
    let report = migrate_model_dir(model_dir)?;
    for name in &report.converted {
        step_ok(name);
    }
    for (name, reason) in &report.skipped {
        println!("  {} {}  {}", "✗".red(), name, reason.dimmed());
    }
    Ok(())
}

pub fn cmd_models(model_dir: &PathBuf) -> anyhow::Result<()> {
    let registry = ModelRegistry::open(model_dir)?;
    for key in registry.list_available() {
        let features = registry.expected_features(&key)?;
        println!("  {}  {}", key.bold(), features.join(", ").dimmed());
    }
    Ok(())
}

pub fn cmd_predict(
    model_dir: &PathBuf,
    key: &str,
    features: &[(String, String)],
) -> anyhow::Result<()> {
    let engine = RiskEngine::new(ModelRegistry::open(model_dir)?);
    let raw: RawFeatures = features.iter().cloned().collect();
    let risk = engine.predict_risk(key, &raw)?;
    println!("  {}  risk = {risk:.4}", key.bold());
    Ok(())
}
