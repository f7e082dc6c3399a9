//! prognos - clinical risk model registry and prediction engine
//!
//! For each disease outcome the engine loads a previously fitted
//! preprocessing+model pair, validates a caller-supplied feature set
//! against a stored schema, and returns a calibrated risk probability.
//!
//! # Modules
//!
//! ## Serving path
//! - [`schema`] - feature schema persistence, the source of truth for
//!   feature identity and order
//! - [`registry`] - artifact resolution, loading, and the process-lifetime
//!   cache
//! - [`validator`] - feature presence checks and value coercion
//! - [`predictor`] - prediction dispatcher with the ranked capability
//!   cascade
//!
//! ## Model internals
//! - [`preprocessing`] - median imputation and ignore-unseen one-hot
//!   encoding
//! - [`model`] - gradient-boosted trees, the one-vs-rest composite, and
//!   the version-portable interchange form
//!
//! ## Offline tooling
//! - [`training`] - batch fitting of per-disease artifact pairs
//! - [`migrate`] - artifact re-serialization with backup-and-replace
//! - [`cli`] - operator command line

pub mod error;

// Serving path
pub mod predictor;
pub mod registry;
pub mod schema;
pub mod validator;

// Model internals
pub mod model;
pub mod preprocessing;

// Offline tooling
pub mod cli;
pub mod migrate;
pub mod training;

pub use error::{Result, RiskError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Result, RiskError};

    pub use crate::predictor::RiskEngine;
    pub use crate::registry::{ArtifactStore, FsStore, LoadedModel, ModelRegistry};
    pub use crate::schema::{FeatureSchema, SchemaStore};
    pub use crate::validator::{FeatureValue, RawFeatures};

    pub use crate::model::{
        Capability, GbmClassifier, GbmConfig, ModelArtifact, OneVsRestClassifier, RiskModel,
    };
    pub use crate::preprocessing::PreprocessPipeline;

    pub use crate::migrate::{migrate_model_dir, MigrationReport};
    pub use crate::training::{
        train_and_save_all_models, BatchReport, FitReport, Trainer, TrainingConfig,
    };
}
