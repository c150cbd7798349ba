//! Deterministic classifier for testing and development
//!
//! The stub "recognises" an image when its file name contains a class label.
//! It needs no ML backend, so the lifecycle can be exercised end to end without
//! real training.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{
    ClassIndexMap, Classifier, ClassifierMetadata, CoreError, Evaluation, Result, ScoreVector,
};

const ARTIFACT_FILE: &str = "stub-model.json";

/// Model produced by [`StubClassifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubModel {
    pub classes: ClassIndexMap,
}

impl StubModel {
    /// 1.0 for every label contained in the file name, 0.0 elsewhere
    fn score(&self, image_path: &Path) -> ScoreVector {
        let name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        self.classes
            .labels()
            .iter()
            .map(|label| {
                if name.contains(&label.to_lowercase()) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// File-name driven classifier with optional failure injection
#[derive(Debug, Clone, Default)]
pub struct StubClassifier {
    fail_training: bool,
    fail_inference: bool,
    fail_save: bool,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `train` call fails with [`CoreError::Training`]
    pub fn failing_training(mut self) -> Self {
        self.fail_training = true;
        self
    }

    /// Every `evaluate` and `predict` call fails with [`CoreError::Inference`]
    pub fn failing_inference(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    /// Every `save` call fails with [`CoreError::Persistence`] after creating the artifact directory
    pub fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }
}

/// Visible subdirectories of `dir`, sorted by name
async fn class_dirs(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.file_type().await?.is_dir() {
            continue;
        }
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

/// Visible regular files of `dir`, sorted by name
async fn files_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl Classifier for StubClassifier {
    type Model = StubModel;

    async fn train(&self, dataset_dir: &Path) -> Result<(StubModel, ClassIndexMap)> {
        if self.fail_training {
            return Err(CoreError::Training("stub configured to fail".to_string()));
        }

        let dirs = class_dirs(dataset_dir).await.map_err(|e| {
            CoreError::Training(format!(
                "Failed to read dataset {}: {}",
                dataset_dir.display(),
                e
            ))
        })?;
        if dirs.is_empty() {
            return Err(CoreError::Training(format!(
                "dataset {} has no class directories",
                dataset_dir.display()
            )));
        }

        let classes = ClassIndexMap::from_labels(dirs.into_iter().map(|(name, _)| name))
            .map_err(|e| CoreError::Training(e.to_string()))?;
        Ok((
            StubModel {
                classes: classes.clone(),
            },
            classes,
        ))
    }

    async fn evaluate(&self, model: &StubModel, dataset_dir: &Path) -> Result<Evaluation> {
        if self.fail_inference {
            return Err(CoreError::Inference("stub configured to fail".to_string()));
        }

        let read_err = |e: std::io::Error| {
            CoreError::Inference(format!(
                "Failed to read dataset {}: {}",
                dataset_dir.display(),
                e
            ))
        };

        let mut total = 0usize;
        let mut correct = 0usize;
        for (label, dir) in class_dirs(dataset_dir).await.map_err(read_err)? {
            for file in files_in(&dir).await.map_err(read_err)? {
                total += 1;
                if model.classes.decode(&model.score(&file))? == label {
                    correct += 1;
                }
            }
        }

        if total == 0 {
            return Err(CoreError::Inference(format!(
                "dataset {} contains no samples",
                dataset_dir.display()
            )));
        }

        let accuracy = correct as f64 / total as f64;
        Ok(Evaluation {
            loss: 1.0 - accuracy,
            accuracy,
        })
    }

    async fn predict(&self, model: &StubModel, image_path: &Path) -> Result<ScoreVector> {
        if self.fail_inference {
            return Err(CoreError::Inference("stub configured to fail".to_string()));
        }
        if !tokio::fs::try_exists(image_path).await.unwrap_or(false) {
            return Err(CoreError::Inference(format!(
                "image not found: {}",
                image_path.display()
            )));
        }
        Ok(model.score(image_path))
    }

    async fn save(&self, model: &StubModel, artifact_dir: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(model)
            .map_err(|e| CoreError::Persistence(format!("Failed to serialize model: {}", e)))?;

        tokio::fs::create_dir_all(artifact_dir)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        if self.fail_save {
            return Err(CoreError::Persistence("injected save failure".to_string()));
        }
        tokio::fs::write(artifact_dir.join(ARTIFACT_FILE), json)
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    async fn load(&self, artifact_dir: &Path) -> Result<StubModel> {
        let bytes = tokio::fs::read(artifact_dir.join(ARTIFACT_FILE))
            .await
            .map_err(|e| {
                CoreError::Persistence(format!(
                    "Failed to read model from {}: {}",
                    artifact_dir.display(),
                    e
                ))
            })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Persistence(format!("Failed to parse model: {}", e)))
    }

    fn metadata(&self) -> ClassifierMetadata {
        ClassifierMetadata {
            name: Some("stub".to_string()),
            description: Some("Matches class labels against image file names".to_string()),
            version: Some("1".to_string()),
        }
    }
}
