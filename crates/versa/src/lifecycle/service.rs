use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Flow, IngestedFile, Ingestor, LifecycleState, Upload};
use crate::error::{Result, VersaError};
use crate::ledger::{HistoryEntry, Operation, OperationKind, OperationLedger, OutcomeStore};
use crate::model_version::service::validate_version;
use crate::model_version::{ModelRegistry, ModelVersion, ModelVersionId, ModelVersionSummary};
use crate::record::{RecordStore, RecordTransaction};
use crate::storage::Storage;
use versa_core::{ClassIndexMap, Classifier, ClassifierMetadata, IdGenerator};

/// Storage prefix for artifacts whose records are not committed yet
pub const STAGING_DIR: &str = ".staging";

/// Answer to a successful training request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReceipt {
    pub status: String,
    pub model_version_id: ModelVersionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub label: String,
}

/// Operations offered to the transport layer
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Train on a zipped dataset and register the model under `version`
    async fn submit_training(&self, version: &str, upload: Upload<'_>) -> Result<TrainingReceipt>;

    /// Evaluate a registered model on a zipped dataset
    async fn submit_evaluation(&self, version: &str, upload: Upload<'_>)
    -> Result<EvaluationReport>;

    /// Classify a single image with a registered model
    async fn submit_prediction(&self, version: &str, upload: Upload<'_>)
    -> Result<PredictionReport>;

    /// All registered model versions, oldest first
    async fn list_model_versions(&self) -> Result<Vec<ModelVersionSummary>>;

    /// Evaluation and prediction history
    async fn list_history(&self) -> Result<Vec<HistoryEntry>>;

    /// Backend that trains and serves the models
    fn classifier_metadata(&self) -> ClassifierMetadata;
}

/// Commit `tx` when `result` is Ok, roll it back otherwise
async fn finish<T>(tx: Box<dyn RecordTransaction>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

fn staging_key(id: &ModelVersionId) -> String {
    format!("{}/{}", STAGING_DIR, id)
}

/// Orchestrates ingestion, the classifier and record keeping for one backend
pub struct LifecycleService<C: Classifier> {
    classifier: Arc<C>,
    storage: Arc<dyn Storage>,
    store: Arc<dyn RecordStore>,
    registry: ModelRegistry,
    ledger: OperationLedger,
    outcomes: OutcomeStore,
    ingestor: Ingestor,
    ids: Arc<dyn IdGenerator>,
}

impl<C: Classifier> LifecycleService<C> {
    pub fn new(
        classifier: Arc<C>,
        storage: Arc<dyn Storage>,
        store: Arc<dyn RecordStore>,
        ingestor: Ingestor,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            classifier,
            registry: ModelRegistry::new(store.clone()),
            ledger: OperationLedger::new(store.clone()),
            outcomes: OutcomeStore::new(),
            storage,
            store,
            ingestor,
            ids,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &OperationLedger {
        &self.ledger
    }

    async fn resolve_version(&self, version: &str) -> Result<ModelVersion> {
        self.registry
            .get_by_version(version)
            .await?
            .ok_or_else(|| VersaError::VersionNotFound(version.to_string()))
    }

    async fn load_model(&self, model: &ModelVersion) -> Result<C::Model> {
        let dir = self.storage.resolve(&model.id.artifact_key())?;
        self.classifier
            .load(&dir)
            .await
            .map_err(VersaError::Inference)
    }

    async fn discard_staged(&self, key: &str) {
        match self.storage.exists(key).await {
            Ok(true) => {
                if let Err(e) = self.storage.delete(key).await {
                    tracing::warn!(key, error = %e, "could not remove staged artifact");
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(key, error = %e, "could not inspect staged artifact"),
        }
    }

    async fn promote(&self, staged: &str, id: &ModelVersionId) -> Result<()> {
        let key = id.artifact_key();
        if let Err(e) = self.storage.rename(staged, &key).await {
            tracing::error!(
                model_version_id = %id,
                staged,
                error = %e,
                "model version committed but its artifact could not be promoted"
            );
            return Err(VersaError::Storage(e));
        }
        Ok(())
    }

    async fn record_training(
        &self,
        tx: &mut dyn RecordTransaction,
        id: ModelVersionId,
        version: &str,
        class_map: ClassIndexMap,
    ) -> Result<ModelVersion> {
        let record = self.registry.create_or_get(tx, id, version, class_map).await?;
        self.ledger
            .record_operation(tx, OperationKind::Train, record.id)
            .await?;
        Ok(record)
    }

    async fn train(
        &self,
        flow: &mut Flow,
        version: &str,
        upload: Upload<'_>,
    ) -> Result<TrainingReceipt> {
        let id = ModelVersionId::from_uuid(self.ids.generate());

        let file = self.ingestor.ingest(upload).await?;
        flow.advance(LifecycleState::Ingested)?;

        let dataset = self.ingestor.extract(&file).await?;
        flow.advance(LifecycleState::Extracted)?;

        let (model, class_map) = self
            .classifier
            .train(&dataset)
            .await
            .map_err(VersaError::Training)?;

        let staged = staging_key(&id);
        let staged_dir = self.storage.resolve(&staged)?;
        if let Err(e) = self.classifier.save(&model, &staged_dir).await {
            self.discard_staged(&staged).await;
            return Err(VersaError::Persistence(e));
        }
        flow.advance(LifecycleState::Computed)?;

        let mut tx = self.store.begin().await?;
        let result = self.record_training(&mut *tx, id, version, class_map).await;
        let record = match finish(tx, result).await {
            Ok(record) => record,
            Err(e) => {
                self.discard_staged(&staged).await;
                return Err(e);
            }
        };

        if record.id == id {
            self.promote(&staged, &id).await?;
        } else {
            self.discard_staged(&staged).await;
        }
        flow.advance(LifecycleState::Persisted)?;

        Ok(TrainingReceipt {
            status: "ok".to_string(),
            model_version_id: record.id,
        })
    }

    async fn record_evaluation(
        &self,
        tx: &mut dyn RecordTransaction,
        model: &ModelVersion,
        file: &IngestedFile,
        report: EvaluationReport,
    ) -> Result<Operation> {
        let operation = self
            .ledger
            .record_operation(tx, OperationKind::Evaluate, model.id)
            .await?;
        self.outcomes
            .record_evaluate_outcome(tx, operation.id, &file.key, report.loss, report.accuracy)
            .await?;
        Ok(operation)
    }

    async fn evaluate(
        &self,
        flow: &mut Flow,
        version: &str,
        upload: Upload<'_>,
    ) -> Result<EvaluationReport> {
        let model_version = self.resolve_version(version).await?;

        let file = self.ingestor.ingest(upload).await?;
        flow.advance(LifecycleState::Ingested)?;

        let dataset = self.ingestor.extract(&file).await?;
        flow.advance(LifecycleState::Extracted)?;

        let model = self.load_model(&model_version).await?;
        let evaluation = self
            .classifier
            .evaluate(&model, &dataset)
            .await
            .map_err(VersaError::Inference)?;
        let report = EvaluationReport {
            loss: evaluation.loss,
            accuracy: evaluation.accuracy,
        };
        flow.advance(LifecycleState::Computed)?;

        let mut tx = self.store.begin().await?;
        let result = self
            .record_evaluation(&mut *tx, &model_version, &file, report)
            .await;
        finish(tx, result).await?;
        flow.advance(LifecycleState::Persisted)?;

        Ok(report)
    }

    async fn record_prediction(
        &self,
        tx: &mut dyn RecordTransaction,
        model: &ModelVersion,
        file: &IngestedFile,
        label: &str,
    ) -> Result<Operation> {
        let operation = self
            .ledger
            .record_operation(tx, OperationKind::Predict, model.id)
            .await?;
        self.outcomes
            .record_predict_outcome(tx, operation.id, &file.key, label)
            .await?;
        Ok(operation)
    }

    async fn predict(
        &self,
        flow: &mut Flow,
        version: &str,
        upload: Upload<'_>,
    ) -> Result<PredictionReport> {
        let model_version = self.resolve_version(version).await?;

        let file = self.ingestor.ingest(upload).await?;
        flow.advance(LifecycleState::Ingested)?;

        let model = self.load_model(&model_version).await?;
        let scores = self
            .classifier
            .predict(&model, &file.path)
            .await
            .map_err(VersaError::Inference)?;
        let class_map = self.registry.get_class_index_map(&model_version.id).await?;
        let label = class_map
            .decode(&scores)
            .map_err(VersaError::Inference)?
            .to_string();
        flow.advance(LifecycleState::Computed)?;

        let mut tx = self.store.begin().await?;
        let result = self
            .record_prediction(&mut *tx, &model_version, &file, &label)
            .await;
        finish(tx, result).await?;
        flow.advance(LifecycleState::Persisted)?;

        Ok(PredictionReport { label })
    }
}

#[async_trait]
impl<C> Lifecycle for LifecycleService<C>
where
    C: Classifier + 'static,
{
    async fn submit_training(&self, version: &str, upload: Upload<'_>) -> Result<TrainingReceipt> {
        let version = validate_version(version)?;
        let mut flow = Flow::new(OperationKind::Train, version);
        let result = self.train(&mut flow, version, upload).await;
        flow.conclude(result)
    }

    async fn submit_evaluation(
        &self,
        version: &str,
        upload: Upload<'_>,
    ) -> Result<EvaluationReport> {
        let version = validate_version(version)?;
        let mut flow = Flow::new(OperationKind::Evaluate, version);
        let result = self.evaluate(&mut flow, version, upload).await;
        flow.conclude(result)
    }

    async fn submit_prediction(
        &self,
        version: &str,
        upload: Upload<'_>,
    ) -> Result<PredictionReport> {
        let version = validate_version(version)?;
        let mut flow = Flow::new(OperationKind::Predict, version);
        let result = self.predict(&mut flow, version, upload).await;
        flow.conclude(result)
    }

    async fn list_model_versions(&self) -> Result<Vec<ModelVersionSummary>> {
        let models = self.registry.list_all().await?;
        Ok(models.iter().map(ModelVersionSummary::from).collect())
    }

    async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        self.ledger.list_history().await
    }

    fn classifier_metadata(&self) -> ClassifierMetadata {
        self.classifier.metadata()
    }
}
