//! Main crate for versa
//!
//! Versioned image-classification model lifecycle: upload a labeled dataset,
//! train a model under a version name, evaluate or predict with it later, and
//! keep a durable record of every operation and its outcome.

pub mod app;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod model_version;
pub mod record;
pub mod storage;

// Re-export core types
pub use versa_core::{
    ClassIndexMap, Classifier, ClassifierMetadata, CoreError, Evaluation, IdGenerator, RandomIds, ScoreVector,
    SequentialIds, StubClassifier, TrainingParameters,
};

pub use app::{VersaAppBuilder, connect_record_store};
pub use config::VersaConfig;
pub use error::{Result as VersaResult, VersaError};
pub use ledger::{HistoryEntry, HistoryOutput, Operation, OperationKind};
pub use lifecycle::{
    EvaluationReport, Lifecycle, LifecycleService, PredictionReport, TrainingReceipt, Upload,
};
pub use model_version::{ModelVersion, ModelVersionId, ModelVersionSummary};

// Feature-gated re-exports
#[cfg(feature = "candle")]
pub use versa_candle::{CandleClassifier, CandleModel};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::lifecycle::{Lifecycle, Upload};
    pub use crate::{VersaAppBuilder, VersaConfig, VersaError};
}
