//! [`Classifier`] implementation backed by candle

use async_trait::async_trait;
use candle_core::Device;
use std::path::Path;

use crate::error::{CandleError, Result};
use crate::model::CandleModel;
use crate::{dataset, train};
use versa_core::{
    ClassIndexMap, Classifier, ClassifierMetadata, CoreError, Evaluation, ScoreVector,
    TrainingParameters,
};

/// Small MLP classifier over resized RGB pixels, running on the CPU
#[derive(Debug, Clone)]
pub struct CandleClassifier {
    params: TrainingParameters,
    device: Device,
}

impl CandleClassifier {
    pub fn new(params: TrainingParameters) -> Self {
        Self {
            params,
            device: Device::Cpu,
        }
    }

    pub fn params(&self) -> &TrainingParameters {
        &self.params
    }
}

impl Default for CandleClassifier {
    fn default() -> Self {
        Self::new(TrainingParameters::default())
    }
}

/// Run CPU-bound tensor work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CandleError::Other(format!("worker task failed: {}", e)))?
}

#[async_trait]
impl Classifier for CandleClassifier {
    type Model = CandleModel;

    async fn train(&self, dataset_dir: &Path) -> versa_core::Result<(CandleModel, ClassIndexMap)> {
        let params = self.params.clone();
        let device = self.device.clone();
        let dir = dataset_dir.to_path_buf();

        let model = blocking(move || train::fit(&params, &dir, &device))
            .await
            .map_err(|e| CoreError::Training(e.to_string()))?;
        let classes = model.classes().clone();
        Ok((model, classes))
    }

    async fn evaluate(
        &self,
        model: &CandleModel,
        dataset_dir: &Path,
    ) -> versa_core::Result<Evaluation> {
        let model = model.clone();
        let device = self.device.clone();
        let dir = dataset_dir.to_path_buf();

        blocking(move || train::evaluate(&model, &dir, &device))
            .await
            .map_err(|e| CoreError::Inference(e.to_string()))
    }

    async fn predict(
        &self,
        model: &CandleModel,
        image_path: &Path,
    ) -> versa_core::Result<ScoreVector> {
        let model = model.clone();
        let device = self.device.clone();
        let path = image_path.to_path_buf();

        blocking(move || {
            let pixels = dataset::load_pixels(&path, model.spec().image_size)?;
            model.scores(pixels, &device)
        })
        .await
        .map_err(|e| CoreError::Inference(e.to_string()))
    }

    async fn save(&self, model: &CandleModel, artifact_dir: &Path) -> versa_core::Result<()> {
        let model = model.clone();
        let dir = artifact_dir.to_path_buf();

        blocking(move || model.save(&dir))
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    async fn load(&self, artifact_dir: &Path) -> versa_core::Result<CandleModel> {
        let device = self.device.clone();
        let dir = artifact_dir.to_path_buf();

        blocking(move || CandleModel::load(&dir, &device))
            .await
            .map_err(|e| CoreError::Persistence(e.to_string()))
    }

    fn metadata(&self) -> ClassifierMetadata {
        ClassifierMetadata {
            name: Some("candle-mlp".to_string()),
            description: Some(format!(
                "{}x{} RGB input, {} hidden units, ReLU, softmax output",
                self.params.image_size, self.params.image_size, self.params.hidden_units
            )),
            version: Some("1".to_string()),
        }
    }
}
