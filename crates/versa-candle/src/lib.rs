//! Candle integration for versa
//!
//! Provides [`CandleClassifier`], a [`versa_core::Classifier`] that trains a small
//! fully connected network on resized RGB pixels.

mod classifier;
mod dataset;
pub mod error;
mod model;
mod train;

pub use classifier::CandleClassifier;
pub use error::CandleError;
pub use model::{CandleModel, ModelSpec};
