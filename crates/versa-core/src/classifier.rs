//! Classifier adapter contract for versa
//!
//! This module defines the boundary between the lifecycle orchestrator and a
//! machine-learning backend. The orchestrator never looks inside a trained model;
//! it only moves it between these five calls.

use crate::{ClassIndexMap, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One score per class index, ordered like the values of the model's [`ClassIndexMap`]
pub type ScoreVector = Vec<f32>;

/// Core trait for training and inference backends
///
/// Implementations must satisfy:
/// - `train` assigns class indices from the dataset layout (one subdirectory per label)
/// - `load(save(model))` behaves identically to `model` for `evaluate` and `predict`
/// - calls may block for their full duration; there is no cancellation
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Opaque trained model handle
    type Model: Send + Sync + 'static;

    /// Train a new model on a dataset directory
    async fn train(&self, dataset_dir: &Path) -> Result<(Self::Model, ClassIndexMap)>;

    /// Compute loss and accuracy of a model on a dataset directory
    async fn evaluate(&self, model: &Self::Model, dataset_dir: &Path) -> Result<Evaluation>;

    /// Score a single image
    async fn predict(&self, model: &Self::Model, image_path: &Path) -> Result<ScoreVector>;

    /// Persist a model into an artifact directory
    async fn save(&self, model: &Self::Model, artifact_dir: &Path) -> Result<()>;

    /// Restore a model from an artifact directory
    async fn load(&self, artifact_dir: &Path) -> Result<Self::Model>;

    /// Get classifier metadata
    fn metadata(&self) -> ClassifierMetadata {
        ClassifierMetadata::default()
    }
}

/// Result of evaluating a model on a labeled dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// Metadata about a classifier backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierMetadata {
    /// Human-readable backend name
    pub name: Option<String>,
    /// Description of the network or algorithm
    pub description: Option<String>,
    /// Artifact format version
    pub version: Option<String>,
}

/// Hyperparameters handed to a training backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParameters {
    /// Number of passes over the training set
    pub epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Optimizer learning rate
    pub learning_rate: f64,
    /// Side length images are resized to before training and inference
    pub image_size: usize,
    /// Width of the hidden layer
    pub hidden_units: usize,
    /// Seed for weight initialisation and shuffling
    pub seed: u64,
}

impl Default for TrainingParameters {
    fn default() -> Self {
        Self {
            epochs: 4,
            batch_size: 40,
            learning_rate: 0.01,
            image_size: 64,
            hidden_units: 128,
            seed: 42,
        }
    }
}
