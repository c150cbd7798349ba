use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use super::{RecordError, RecordStore, RecordTransaction, Result};
use crate::ledger::{
    EvaluateOutcome, HistoryEntry, HistoryOutput, Operation, OperationId, OperationKind,
    PredictOutcome,
};
use crate::model_version::{ModelVersion, ModelVersionId};

/// Rows in insertion order
#[derive(Debug, Clone, Default)]
struct Tables {
    model_versions: Vec<ModelVersion>,
    operations: Vec<Operation>,
    evaluate_outcomes: Vec<EvaluateOutcome>,
    predict_outcomes: Vec<PredictOutcome>,
}

impl Tables {
    fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.operations.iter().find(|op| &op.id == id)
    }

    fn has_outcome(&self, id: &OperationId) -> bool {
        self.evaluate_outcomes.iter().any(|o| &o.operation_id == id)
            || self.predict_outcomes.iter().any(|o| &o.operation_id == id)
    }

    /// Validate that `id` names an operation of `expected` kind without an outcome
    fn check_outcome_target(&self, id: &OperationId, expected: OperationKind) -> Result<()> {
        let operation = self
            .operation(id)
            .ok_or_else(|| RecordError::Referential(format!("operation {}", id)))?;

        if operation.kind != expected {
            return Err(RecordError::OutcomeKindMismatch {
                operation: id.to_string(),
                expected,
                actual: operation.kind,
            });
        }
        if self.has_outcome(id) {
            return Err(RecordError::DuplicateOutcome(id.to_string()));
        }
        Ok(())
    }

    fn history_entry(
        &self,
        operation_id: &OperationId,
        input_ref: &str,
        output: HistoryOutput,
    ) -> Option<HistoryEntry> {
        self.operation(operation_id).map(|op| HistoryEntry {
            kind: op.kind,
            time: op.time,
            model_version_id: op.model_version_id,
            input_ref: input_ref.to_string(),
            output,
        })
    }
}

/// In-memory implementation of RecordStore.
///
/// Transactions hold the write lock for their whole lifetime, so they run one at
/// a time; readers see only committed state.
#[derive(Clone)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRecordStore {
    /// Create a new in-memory record store
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>> {
        let guard = self.tables.clone().write_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, staged }))
    }

    async fn model_version_by_name(&self, version: &str) -> Result<Option<ModelVersion>> {
        let tables = self.tables.read().await;
        Ok(tables
            .model_versions
            .iter()
            .find(|m| m.version == version)
            .cloned())
    }

    async fn model_version_by_id(&self, id: &ModelVersionId) -> Result<Option<ModelVersion>> {
        let tables = self.tables.read().await;
        Ok(tables.model_versions.iter().find(|m| &m.id == id).cloned())
    }

    async fn list_model_versions(&self) -> Result<Vec<ModelVersion>> {
        let tables = self.tables.read().await;
        Ok(tables.model_versions.clone())
    }

    async fn list_operations(&self, model_version_id: &ModelVersionId) -> Result<Vec<Operation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .operations
            .iter()
            .filter(|op| &op.model_version_id == model_version_id)
            .cloned()
            .collect())
    }

    async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let tables = self.tables.read().await;

        let evaluations = tables.evaluate_outcomes.iter().filter_map(|o| {
            tables.history_entry(
                &o.operation_id,
                &o.input_ref,
                HistoryOutput::Evaluation {
                    loss: o.loss,
                    accuracy: o.accuracy,
                },
            )
        });
        let predictions = tables.predict_outcomes.iter().filter_map(|o| {
            tables.history_entry(
                &o.operation_id,
                &o.input_ref,
                HistoryOutput::Prediction {
                    label: o.label.clone(),
                },
            )
        });

        Ok(evaluations.chain(predictions).collect())
    }
}

struct InMemoryTransaction {
    guard: OwnedRwLockWriteGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl RecordTransaction for InMemoryTransaction {
    async fn create_or_get_model_version(
        &mut self,
        candidate: ModelVersion,
    ) -> Result<ModelVersion> {
        if let Some(existing) = self
            .staged
            .model_versions
            .iter()
            .find(|m| m.version == candidate.version)
        {
            return Ok(existing.clone());
        }
        if self.staged.model_versions.iter().any(|m| m.id == candidate.id) {
            return Err(RecordError::InvalidData(format!(
                "model version id {} is already taken",
                candidate.id
            )));
        }

        self.staged.model_versions.push(candidate.clone());
        Ok(candidate)
    }

    async fn insert_operation(&mut self, operation: Operation) -> Result<Operation> {
        if !self
            .staged
            .model_versions
            .iter()
            .any(|m| m.id == operation.model_version_id)
        {
            return Err(RecordError::Referential(format!(
                "model version {}",
                operation.model_version_id
            )));
        }

        self.staged.operations.push(operation.clone());
        Ok(operation)
    }

    async fn insert_evaluate_outcome(
        &mut self,
        outcome: EvaluateOutcome,
    ) -> Result<EvaluateOutcome> {
        self.staged
            .check_outcome_target(&outcome.operation_id, OperationKind::Evaluate)?;
        self.staged.evaluate_outcomes.push(outcome.clone());
        Ok(outcome)
    }

    async fn insert_predict_outcome(&mut self, outcome: PredictOutcome) -> Result<PredictOutcome> {
        self.staged
            .check_outcome_target(&outcome.operation_id, OperationKind::Predict)?;
        self.staged.predict_outcomes.push(outcome.clone());
        Ok(outcome)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
