pub mod model;
pub mod service;

pub use model::{
    EvaluateOutcome, HistoryEntry, HistoryOutput, Operation, OperationId, OperationKind,
    PredictOutcome,
};
pub use service::{OperationLedger, OutcomeStore};
