//! # Versa core
//!
//! Shared contract between the lifecycle orchestrator and the machine-learning
//! backends: the [`Classifier`] adapter trait, the [`ClassIndexMap`] used to decode
//! score vectors, training hyperparameters and identifier generation.

pub mod class_map;
pub mod classifier;
pub mod error;
pub mod ids;
pub mod stub;

pub use class_map::ClassIndexMap;
pub use classifier::{Classifier, ClassifierMetadata, Evaluation, ScoreVector, TrainingParameters};
pub use error::{CoreError, Result};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use stub::{StubClassifier, StubModel};
