use async_trait::async_trait;

use super::Result;
use crate::ledger::{EvaluateOutcome, HistoryEntry, Operation, PredictOutcome};
use crate::model_version::{ModelVersion, ModelVersionId};

/// Read side of the record store plus the entry point for writes.
///
/// Every write goes through a [`RecordTransaction`]; nothing becomes visible to
/// readers before `commit`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Start a write transaction
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>>;

    /// Get a model version by its unique version name
    async fn model_version_by_name(&self, version: &str) -> Result<Option<ModelVersion>>;

    /// Get a model version by ID
    async fn model_version_by_id(&self, id: &ModelVersionId) -> Result<Option<ModelVersion>>;

    /// List all model versions in insertion order
    async fn list_model_versions(&self) -> Result<Vec<ModelVersion>>;

    /// List the operations of one model version in insertion order
    async fn list_operations(&self, model_version_id: &ModelVersionId) -> Result<Vec<Operation>>;

    /// All evaluate outcomes followed by all predict outcomes, each in insertion order
    async fn list_history(&self) -> Result<Vec<HistoryEntry>>;
}

/// Unit of work spanning several record writes
#[async_trait]
pub trait RecordTransaction: Send {
    /// Insert `candidate` unless its version name exists; returns the stored record
    async fn create_or_get_model_version(&mut self, candidate: ModelVersion)
    -> Result<ModelVersion>;

    /// Append an operation; its model version must exist
    async fn insert_operation(&mut self, operation: Operation) -> Result<Operation>;

    /// Attach an outcome to an existing evaluate operation
    async fn insert_evaluate_outcome(&mut self, outcome: EvaluateOutcome)
    -> Result<EvaluateOutcome>;

    /// Attach an outcome to an existing predict operation
    async fn insert_predict_outcome(&mut self, outcome: PredictOutcome) -> Result<PredictOutcome>;

    /// Make every write of this transaction visible
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write of this transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}
