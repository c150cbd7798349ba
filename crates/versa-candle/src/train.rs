//! Mini-batch SGD training and labeled evaluation

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Optimizer, SGD, loss::cross_entropy};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::Path;

use crate::dataset;
use crate::error::{CandleError, Result};
use crate::model::{CandleModel, ModelSpec, Parameters};
use versa_core::{ClassIndexMap, Evaluation, TrainingParameters};

fn validate(params: &TrainingParameters) -> Result<()> {
    if params.batch_size == 0 {
        return Err(CandleError::InvalidConfig("batch_size must be positive".to_string()));
    }
    if params.image_size == 0 || params.hidden_units == 0 {
        return Err(CandleError::InvalidConfig(
            "image_size and hidden_units must be positive".to_string(),
        ));
    }
    if !(params.learning_rate.is_finite() && params.learning_rate > 0.0) {
        return Err(CandleError::InvalidConfig(format!(
            "learning_rate {} is not a positive number",
            params.learning_rate
        )));
    }
    Ok(())
}

/// Train a fresh network on a class-per-directory dataset
pub fn fit(params: &TrainingParameters, dataset_dir: &Path, device: &Device) -> Result<CandleModel> {
    validate(params)?;

    let folders = dataset::scan(dataset_dir)?;
    let classes = ClassIndexMap::from_labels(folders.iter().map(|f| f.label.clone()))
        .map_err(|e| CandleError::InvalidDataset(e.to_string()))?;
    let (features, labels) = dataset::load_labeled(&folders, &classes, params.image_size, device)?;

    let spec = ModelSpec {
        image_size: params.image_size,
        hidden_units: params.hidden_units,
        classes,
    };
    let parameters = Parameters::init(&spec, params.seed, device)?;
    let model = CandleModel::from_parameters(spec, &parameters)?;
    let mut optimizer = SGD::new(parameters.all_vars(), params.learning_rate)?;

    let samples = labels.dim(0)?;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut order: Vec<u32> = (0..samples as u32).collect();

    for epoch in 0..params.epochs {
        order.shuffle(&mut rng);
        let mut epoch_loss = 0f32;
        let mut batches = 0usize;

        for batch in order.chunks(params.batch_size) {
            let index = Tensor::new(batch, device)?;
            let xs = features.index_select(&index, 0)?;
            let ys = labels.index_select(&index, 0)?;

            let loss = cross_entropy(&model.logits(&xs)?, &ys)?;
            optimizer.backward_step(&loss)?;

            epoch_loss += loss.to_scalar::<f32>()?;
            batches += 1;
        }

        tracing::debug!(
            epoch = epoch + 1,
            loss = epoch_loss / batches.max(1) as f32,
            "training epoch finished"
        );
    }

    Ok(model)
}

/// Mean cross-entropy and accuracy over every image of a labeled dataset
pub fn evaluate(model: &CandleModel, dataset_dir: &Path, device: &Device) -> Result<Evaluation> {
    let folders = dataset::scan(dataset_dir)?;
    let (features, labels) =
        dataset::load_labeled(&folders, model.classes(), model.spec().image_size, device)?;

    let logits = model.logits(&features)?;
    let loss = cross_entropy(&logits, &labels)?.to_scalar::<f32>()?;
    let accuracy = logits
        .argmax(D::Minus1)?
        .eq(&labels)?
        .to_dtype(DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()?;

    Ok(Evaluation {
        loss: loss as f64,
        accuracy: accuracy as f64,
    })
}
