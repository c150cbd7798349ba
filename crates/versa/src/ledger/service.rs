use std::sync::Arc;
use uuid::Uuid;

use super::{
    EvaluateOutcome, HistoryEntry, Operation, OperationId, OperationKind, PredictOutcome,
};
use crate::error::Result;
use crate::model_version::ModelVersionId;
use crate::record::{RecordStore, RecordTransaction};

/// Append-only log of train, evaluate and predict invocations
#[derive(Clone)]
pub struct OperationLedger {
    store: Arc<dyn RecordStore>,
}

impl OperationLedger {
    /// Create a new OperationLedger
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Record an operation against an existing model version
    pub async fn record_operation(
        &self,
        tx: &mut dyn RecordTransaction,
        kind: OperationKind,
        model_version_id: ModelVersionId,
    ) -> Result<Operation> {
        Ok(tx
            .insert_operation(Operation::new(kind, model_version_id))
            .await?)
    }

    /// Evaluate outcomes followed by predict outcomes, each oldest first
    pub async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.store.list_history().await?)
    }

    /// Every operation recorded against one model version, oldest first
    pub async fn list_operations(&self, model_version_id: &ModelVersionId) -> Result<Vec<Operation>> {
        Ok(self.store.list_operations(model_version_id).await?)
    }
}

/// Results of evaluate and predict operations, one per operation
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeStore;

impl OutcomeStore {
    pub fn new() -> Self {
        Self
    }

    pub async fn record_evaluate_outcome(
        &self,
        tx: &mut dyn RecordTransaction,
        operation_id: OperationId,
        input_ref: &str,
        loss: f64,
        accuracy: f64,
    ) -> Result<EvaluateOutcome> {
        let outcome = EvaluateOutcome {
            id: Uuid::new_v4(),
            operation_id,
            input_ref: input_ref.to_string(),
            loss,
            accuracy,
        };
        Ok(tx.insert_evaluate_outcome(outcome).await?)
    }

    pub async fn record_predict_outcome(
        &self,
        tx: &mut dyn RecordTransaction,
        operation_id: OperationId,
        input_ref: &str,
        label: &str,
    ) -> Result<PredictOutcome> {
        let outcome = PredictOutcome {
            id: Uuid::new_v4(),
            operation_id,
            input_ref: input_ref.to_string(),
            label: label.to_string(),
        };
        Ok(tx.insert_predict_outcome(outcome).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VersaError;
    use crate::model_version::{ModelRegistry, ModelVersionId};
    use crate::record::InMemoryRecordStore;
    use versa_core::ClassIndexMap;

    #[tokio::test]
    async fn test_predict_outcome_on_evaluate_operation_is_rejected() {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let registry = ModelRegistry::new(store.clone());
        let ledger = OperationLedger::new(store.clone());
        let outcomes = OutcomeStore::new();

        let mut tx = store.begin().await.unwrap();
        let model = registry
            .create_or_get(
                &mut *tx,
                ModelVersionId::new(),
                "v1",
                ClassIndexMap::from_labels(["cat", "dog"]).unwrap(),
            )
            .await
            .unwrap();
        let operation = ledger
            .record_operation(&mut *tx, OperationKind::Evaluate, model.id)
            .await
            .unwrap();

        let result = outcomes
            .record_predict_outcome(&mut *tx, operation.id, "cat.png", "cat")
            .await;
        assert!(matches!(result, Err(VersaError::OutcomeKindMismatch(_))));

        outcomes
            .record_evaluate_outcome(&mut *tx, operation.id, "eval.zip", 0.2, 0.9)
            .await
            .unwrap();
        let again = outcomes
            .record_evaluate_outcome(&mut *tx, operation.id, "eval.zip", 0.2, 0.9)
            .await;
        assert!(matches!(again, Err(VersaError::DuplicateOutcome(_))));
        tx.commit().await.unwrap();

        let history = ledger.list_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].input_ref, "eval.zip");
    }

    #[tokio::test]
    async fn test_operation_for_unknown_version_is_referential_error() {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let ledger = OperationLedger::new(store.clone());

        let mut tx = store.begin().await.unwrap();
        let result = ledger
            .record_operation(&mut *tx, OperationKind::Train, ModelVersionId::new())
            .await;
        assert!(matches!(result, Err(VersaError::Referential(_))));
    }
}
