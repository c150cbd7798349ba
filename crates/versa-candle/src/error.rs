//! Error types for versa-candle

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CandleError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CandleError>;
