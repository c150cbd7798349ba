//! Network definition and artifact format for the candle backend

use candle_core::{D, Device, Module, Tensor, Var};
use candle_nn::Linear;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CandleError, Result};
use versa_core::ClassIndexMap;

const WEIGHTS_FILE: &str = "weights.safetensors";
const SPEC_FILE: &str = "model.json";

const FC1_WEIGHT: &str = "fc1.weight";
const FC1_BIAS: &str = "fc1.bias";
const FC2_WEIGHT: &str = "fc2.weight";
const FC2_BIAS: &str = "fc2.bias";

/// Shape of the network plus the class map it was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub image_size: usize,
    pub hidden_units: usize,
    pub classes: ClassIndexMap,
}

impl ModelSpec {
    pub fn input_dim(&self) -> usize {
        self.image_size * self.image_size * 3
    }

    fn expected_shapes(&self) -> [(&'static str, Vec<usize>); 4] {
        let classes = self.classes.len();
        [
            (FC1_WEIGHT, vec![self.hidden_units, self.input_dim()]),
            (FC1_BIAS, vec![self.hidden_units]),
            (FC2_WEIGHT, vec![classes, self.hidden_units]),
            (FC2_BIAS, vec![classes]),
        ]
    }
}

/// Two linear layers with a ReLU in between
struct Mlp {
    fc1: Linear,
    fc2: Linear,
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.apply(&self.fc1)?.relu()?.apply(&self.fc2)
    }
}

/// Trainable parameters, initialised uniformly in `±1/sqrt(fan_in)` from a seed
pub(crate) struct Parameters {
    pub vars: Vec<(&'static str, Var)>,
}

impl Parameters {
    pub fn init(spec: &ModelSpec, seed: u64, device: &Device) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut vars = Vec::new();

        for (name, shape) in spec.expected_shapes() {
            let fan_in = if name == FC1_WEIGHT || name == FC1_BIAS {
                spec.input_dim()
            } else {
                spec.hidden_units
            };
            let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
            let count: usize = shape.iter().product();
            let data: Vec<f32> = (0..count).map(|_| rng.gen_range(-bound..bound)).collect();
            vars.push((name, Var::from_vec(data, shape.as_slice(), device)?));
        }

        Ok(Self { vars })
    }

    pub fn all_vars(&self) -> Vec<Var> {
        self.vars.iter().map(|(_, var)| var.clone()).collect()
    }

    /// Tensors sharing storage with the vars, so optimizer steps stay visible
    pub fn tensors(&self) -> HashMap<String, Tensor> {
        self.vars
            .iter()
            .map(|(name, var)| (name.to_string(), var.as_tensor().clone()))
            .collect()
    }
}

struct Inner {
    spec: ModelSpec,
    tensors: HashMap<String, Tensor>,
    net: Mlp,
}

/// Trained network; cheap to clone
#[derive(Clone)]
pub struct CandleModel {
    inner: Arc<Inner>,
}

impl fmt::Debug for CandleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandleModel")
            .field("spec", &self.inner.spec)
            .finish_non_exhaustive()
    }
}

impl CandleModel {
    pub(crate) fn from_tensors(spec: ModelSpec, tensors: HashMap<String, Tensor>) -> Result<Self> {
        for (name, shape) in spec.expected_shapes() {
            let tensor = tensors
                .get(name)
                .ok_or_else(|| CandleError::Other(format!("missing tensor '{}'", name)))?;
            if tensor.dims() != shape.as_slice() {
                return Err(CandleError::Other(format!(
                    "tensor '{}' has shape {:?}, expected {:?}",
                    name,
                    tensor.dims(),
                    shape
                )));
            }
        }

        let linear = |weight: &str, bias: &str| {
            Linear::new(tensors[weight].clone(), Some(tensors[bias].clone()))
        };
        let net = Mlp {
            fc1: linear(FC1_WEIGHT, FC1_BIAS),
            fc2: linear(FC2_WEIGHT, FC2_BIAS),
        };

        Ok(Self {
            inner: Arc::new(Inner { spec, tensors, net }),
        })
    }

    pub(crate) fn from_parameters(spec: ModelSpec, parameters: &Parameters) -> Result<Self> {
        Self::from_tensors(spec, parameters.tensors())
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.inner.spec
    }

    pub fn classes(&self) -> &ClassIndexMap {
        &self.inner.spec.classes
    }

    /// Raw logits for a `(batch, input_dim)` feature matrix
    pub(crate) fn logits(&self, features: &Tensor) -> Result<Tensor> {
        Ok(self.inner.net.forward(features)?)
    }

    /// Class probabilities for a single flattened image
    pub(crate) fn scores(&self, pixels: Vec<f32>, device: &Device) -> Result<Vec<f32>> {
        let dim = pixels.len();
        let features = Tensor::from_vec(pixels, (1, dim), device)?;
        let probs = candle_nn::ops::softmax(&self.logits(&features)?, D::Minus1)?;
        Ok(probs.squeeze(0)?.to_vec1::<f32>()?)
    }

    pub(crate) fn save(&self, artifact_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(artifact_dir)?;
        candle_core::safetensors::save(&self.inner.tensors, artifact_dir.join(WEIGHTS_FILE))?;
        let spec = serde_json::to_vec_pretty(&self.inner.spec)?;
        std::fs::write(artifact_dir.join(SPEC_FILE), spec)?;
        Ok(())
    }

    pub(crate) fn load(artifact_dir: &Path, device: &Device) -> Result<Self> {
        let spec: ModelSpec =
            serde_json::from_slice(&std::fs::read(artifact_dir.join(SPEC_FILE))?)?;
        let tensors = candle_core::safetensors::load(artifact_dir.join(WEIGHTS_FILE), device)?;
        Self::from_tensors(spec, tensors)
    }
}
