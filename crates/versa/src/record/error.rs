use thiserror::Error;

use crate::ledger::OperationKind;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Referenced record does not exist: {0}")]
    Referential(String),

    #[error("Operation {0} already has an outcome")]
    DuplicateOutcome(String),

    #[error("Operation {operation} is a {actual} operation, not {expected}")]
    OutcomeKindMismatch {
        operation: String,
        expected: OperationKind,
        actual: OperationKind,
    },

    #[error("Invalid record data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, RecordError>;
