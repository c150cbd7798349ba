//! Error types for versa crate

use thiserror::Error;

use crate::record::RecordError;
use crate::storage::StorageError;
use versa_core::CoreError;

#[derive(Error, Debug)]
pub enum VersaError {
    #[error("Error uploading file: {0}")]
    Upload(String),

    #[error("Could not extract archive: {0}")]
    Extraction(String),

    #[error(
        "The model version: '{0}' doesn't exist. Please use an available model version."
    )]
    VersionNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Training failed: {0}")]
    Training(CoreError),

    #[error("Inference failed: {0}")]
    Inference(CoreError),

    #[error("Could not save model: {0}")]
    Persistence(CoreError),

    #[error("Referenced record does not exist: {0}")]
    Referential(String),

    #[error("Duplicate outcome: {0}")]
    DuplicateOutcome(String),

    #[error("Outcome kind mismatch: {0}")]
    OutcomeKindMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record store error: {0}")]
    Record(RecordError),

    #[error("Invalid lifecycle transition: {0}")]
    InvalidTransition(String),
}

impl VersaError {
    /// Errors caused by the request rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VersaError::Extraction(_)
                | VersaError::VersionNotFound(_)
                | VersaError::NotFound(_)
                | VersaError::InvalidInput(_)
        )
    }
}

impl From<RecordError> for VersaError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::NotFound(what) => VersaError::NotFound(what),
            RecordError::Referential(what) => VersaError::Referential(what),
            RecordError::DuplicateOutcome(operation) => VersaError::DuplicateOutcome(operation),
            mismatch @ RecordError::OutcomeKindMismatch { .. } => {
                VersaError::OutcomeKindMismatch(mismatch.to_string())
            }
            other => VersaError::Record(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, VersaError>;
