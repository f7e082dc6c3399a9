//! Feature schema persistence
//!
//! The schema document is the single source of truth for feature identity
//! and order. Each disease key maps to the exact ordered feature list its
//! preprocessing pipeline was fit with; composite keys additionally carry
//! an ordered component-outcome list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Schema document: disease key -> ordered feature list, plus per-key
/// component lists for composite outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Ordered feature names per disease key. Order is load-bearing: the
    /// preprocessing pipeline is positionally fit.
    pub features: BTreeMap<String, Vec<String>>,
    /// Ordered component-outcome names for composite keys.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, Vec<String>>,
}

impl FeatureSchema {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// All disease keys with a recorded feature list.
    pub fn disease_keys(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    pub fn features_for(&self, key: &str) -> Option<&[String]> {
        self.features.get(key).map(|v| v.as_slice())
    }

    pub fn components_for(&self, key: &str) -> Option<&[String]> {
        self.components.get(key).map(|v| v.as_slice())
    }

    /// Record the realized feature list for a key, replacing any prior entry.
    pub fn set_features(&mut self, key: impl Into<String>, features: Vec<String>) {
        self.features.insert(key.into(), features);
    }

    /// Record the ordered component list for a composite key.
    pub fn set_components(&mut self, key: impl Into<String>, components: Vec<String>) {
        self.components.insert(key.into(), components);
    }
}

/// File-backed store for the schema document.
#[derive(Debug, Clone)]
pub struct SchemaStore {
    path: PathBuf,
}

pub const SCHEMA_FILE_NAME: &str = "schema.json";

impl SchemaStore {
    /// Store rooted at `model_dir`; the document lives alongside the
    /// artifact files.
    pub fn new(model_dir: impl AsRef<Path>) -> Self {
        Self {
            path: model_dir.as_ref().join(SCHEMA_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full mapping. An absent document is an empty schema, not an
    /// error.
    pub fn load(&self) -> Result<FeatureSchema> {
        if !self.path.exists() {
            return Ok(FeatureSchema::default());
        }
        let text = fs::read_to_string(&self.path)?;
        let schema = serde_json::from_str(&text)?;
        Ok(schema)
    }

    /// Persist the full mapping, overwriting prior contents. Written to a
    /// temporary sibling first, then renamed, so a crash mid-write never
    /// leaves a truncated document.
    pub fn save(&self, schema: &FeatureSchema) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(schema)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
