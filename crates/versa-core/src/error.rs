//! Error types for versa-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Training error: {0}")]
    Training(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Model persistence error: {0}")]
    Persistence(String),

    #[error("Invalid class index map: {0}")]
    InvalidClassMap(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
