//! Artifact migration tool
//!
//! Re-serializes stored model artifacts by round-tripping every underlying
//! estimator through the version-portable interchange form, insulating
//! durable storage against breaking changes in the artifact encoding.
//! Offline operator tooling, run sequentially over one model directory.
//!
//! Safety protocol per artifact: all sub-components are converted before
//! anything is written; on any conversion failure the artifact is left
//! byte-identical with no backup created. On success the original is
//! copied to a `.bak` sibling, the replacement is written to a temporary
//! file and atomically renamed into place, and interchange temp files are
//! removed only after the rename. Interruption between artifacts is safe.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Result, RiskError};
use crate::model::{flat::InterchangeDoc, GbmClassifier, ModelArtifact};
use crate::registry::MODEL_SUFFIX;

/// Suffix appended to the original artifact name for its backup.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Outcome of one directory migration. Skipped artifacts carry the reason;
/// the run never aborts on a single artifact.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub converted: Vec<String>,
    pub skipped: Vec<(String, String)>,
}

/// Migrate every model artifact under `model_dir`, sequentially.
pub fn migrate_model_dir(model_dir: &Path) -> Result<MigrationReport> {
    let mut model_files: Vec<PathBuf> = fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(MODEL_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    model_files.sort();

    let mut report = MigrationReport::default();
    for path in model_files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        info!(artifact = %name, "processing artifact");
        match migrate_artifact(&path) {
            Ok(()) => report.converted.push(name),
            Err(e) => {
                warn!(artifact = %name, error = %e, "left untouched; continuing");
                report.skipped.push((name, e.to_string()));
            }
        }
    }

    info!(
        converted = report.converted.len(),
        skipped = report.skipped.len(),
        "migration complete"
    );
    Ok(report)
}

/// Detect the stored encoding: the tagged artifact envelope, or a raw
/// unwrapped estimator from before the envelope existed.
fn detect_artifact(bytes: &[u8]) -> Result<ModelArtifact> {
    if let Ok(artifact) = bincode::deserialize::<ModelArtifact>(bytes) {
        return Ok(artifact);
    }
    if let Ok(raw) = bincode::deserialize::<GbmClassifier>(bytes) {
        // Legacy raw estimator: gains the envelope on rewrite.
        return Ok(ModelArtifact::Single(raw));
    }
    Err(RiskError::Conversion(
        "Unrecognized artifact encoding".into(),
    ))
}

/// Migrate one artifact file through backup-and-replace.
pub fn migrate_artifact(path: &Path) -> Result<()> {
    let original = fs::read(path)?;
    let artifact = detect_artifact(&original)?;

    // Extraction is all-or-nothing: a single failing sub-estimator leaves
    // the file untouched and unbacked-up.
    let doc = InterchangeDoc::from_artifact(&artifact)?;

    let interchange_path = sibling(path, ".interchange.json");
    fs::write(&interchange_path, serde_json::to_vec_pretty(&doc)?)?;

    // Reconstruct from the on-disk interchange document, not the in-memory
    // one: the file is what survives an encoding change.
    let fresh = read_back(&interchange_path).inspect_err(|_| {
        let _ = fs::remove_file(&interchange_path);
    })?;

    let backup_path = sibling(path, BACKUP_SUFFIX);
    fs::copy(path, &backup_path)?;

    let tmp_path = sibling(path, ".tmp");
    fs::write(&tmp_path, bincode::serialize(&fresh)?)?;
    fs::rename(&tmp_path, path)?;

    // The replacement is durable; the interchange temp can go.
    fs::remove_file(&interchange_path)?;
    Ok(())
}

fn read_back(interchange_path: &Path) -> Result<ModelArtifact> {
    let doc: InterchangeDoc = serde_json::from_slice(&fs::read(interchange_path)?)?;
    doc.into_artifact()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    path.with_file_name(format!("{name}{suffix}"))
}
