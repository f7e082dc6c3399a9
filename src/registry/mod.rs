//! Artifact registry and loader
//!
//! Resolves a disease key to its two artifact locations, deserializes them,
//! and caches the loaded triple for the process lifetime. The cache is an
//! explicit object owned by the caller, guarded by one coarse mutex:
//! population happens at most once per key, so concurrent first-time loads
//! never duplicate work and later callers share the same `Arc` entry.
//! There is no invalidation and no hot reload; deploying new artifacts
//! requires a process restart.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, RiskError};
use crate::model::ModelArtifact;
use crate::preprocessing::PreprocessPipeline;
use crate::schema::{FeatureSchema, SchemaStore};

/// Suffix of the preprocessing artifact file.
pub const PREPROC_SUFFIX: &str = ".preproc.bin";
/// Suffix of the model artifact file.
pub const MODEL_SUFFIX: &str = ".model.bin";

/// Byte-level access to artifact storage. The filesystem implementation is
/// the only one used in production; tests substitute counting or failing
/// backends.
pub trait ArtifactStore: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// Plain filesystem storage.
#[derive(Debug, Default)]
pub struct FsStore;

impl ArtifactStore for FsStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(fs::write(path, bytes)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Normalize a disease key into a file-name stem. Spaces and path
/// separators are disallowed in artifact names.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// The two storage locations of one key's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub preproc: PathBuf,
    pub model: PathBuf,
}

/// Resolve the artifact pair for a key under `model_dir`.
pub fn resolve_paths(model_dir: &Path, key: &str) -> ArtifactPaths {
    let stem = normalize_key(key);
    ArtifactPaths {
        preproc: model_dir.join(format!("{stem}{PREPROC_SUFFIX}")),
        model: model_dir.join(format!("{stem}{MODEL_SUFFIX}")),
    }
}

/// Persist a fitted artifact pair for a key. Training writes through this
/// so naming stays consistent with the loader.
pub fn save_artifacts(
    store: &dyn ArtifactStore,
    model_dir: &Path,
    key: &str,
    pipeline: &PreprocessPipeline,
    model: &ModelArtifact,
) -> Result<ArtifactPaths> {
    let paths = resolve_paths(model_dir, key);
    store.write(&paths.preproc, &bincode::serialize(pipeline)?)?;
    store.write(&paths.model, &bincode::serialize(model)?)?;
    Ok(paths)
}

/// A loaded (pipeline, estimator, feature list) triple.
#[derive(Debug)]
pub struct LoadedModel {
    pub pipeline: PreprocessPipeline,
    pub model: ModelArtifact,
    pub features: Vec<String>,
    /// Ordered component outcomes for composite keys.
    pub components: Option<Vec<String>>,
}

/// Process-lifetime registry over one model directory.
pub struct ModelRegistry {
    model_dir: PathBuf,
    store: Arc<dyn ArtifactStore>,
    schema: FeatureSchema,
    cache: Mutex<HashMap<String, Arc<LoadedModel>>>,
}

impl ModelRegistry {
    /// Open the registry, reading the schema document once. Artifact files
    /// themselves are only touched lazily at `load` time.
    pub fn open(model_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_store(model_dir, Arc::new(FsStore))
    }

    /// Open with a custom storage backend.
    pub fn with_store(
        model_dir: impl AsRef<Path>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self> {
        let model_dir = model_dir.as_ref().to_path_buf();
        let schema = SchemaStore::new(&model_dir).load()?;
        Ok(Self {
            model_dir,
            store,
            schema,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// All keys present in the schema. Artifact existence is not verified
    /// here; a missing file surfaces at `load` time.
    pub fn list_available(&self) -> Vec<String> {
        self.schema.disease_keys()
    }

    /// Ordered expected features for a key, straight from the schema.
    pub fn expected_features(&self, key: &str) -> Result<Vec<String>> {
        self.schema
            .features_for(key)
            .map(|f| f.to_vec())
            .ok_or_else(|| RiskError::UnknownDiseaseKey(key.to_string()))
    }

    /// Resolve the artifact pair for a key.
    pub fn resolve_paths(&self, key: &str) -> ArtifactPaths {
        resolve_paths(&self.model_dir, key)
    }

    /// Load (or return the cached) triple for a key. The cache mutex is
    /// held across population, so exactly one load executes per key and
    /// concurrent callers block until the entry exists.
    pub fn load(&self, key: &str) -> Result<Arc<LoadedModel>> {
        let mut cache = self.cache.lock();
        if let Some(entry) = cache.get(key) {
            return Ok(Arc::clone(entry));
        }

        let features = self.expected_features(key)?;
        let paths = self.resolve_paths(key);
        if !self.store.exists(&paths.preproc) || !self.store.exists(&paths.model) {
            return Err(RiskError::ArtifactNotFound {
                key: key.to_string(),
                preproc: paths.preproc,
                model: paths.model,
            });
        }

        debug!(key, preproc = %paths.preproc.display(), model = %paths.model.display(), "loading artifacts");
        let pipeline: PreprocessPipeline =
            bincode::deserialize(&self.store.read(&paths.preproc)?)?;
        let model: ModelArtifact = bincode::deserialize(&self.store.read(&paths.model)?)?;

        let entry = Arc::new(LoadedModel {
            pipeline,
            model,
            features,
            components: self.schema.components_for(key).map(|c| c.to_vec()),
        });
        cache.insert(key.to_string(), Arc::clone(&entry));
        Ok(entry)
    }
}
