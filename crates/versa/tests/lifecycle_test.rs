use async_trait::async_trait;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;
use zip::write::SimpleFileOptions;

use versa::ledger::{EvaluateOutcome, HistoryEntry, Operation, PredictOutcome};
use versa::record::{InMemoryRecordStore, RecordError, RecordStore, RecordTransaction};
use versa::storage::{LocalStorage, Storage, StorageError, StorageResult};
use versa::{
    ClassIndexMap, HistoryOutput, Lifecycle, LifecycleService, ModelVersion, ModelVersionId,
    OperationKind, SequentialIds, StubClassifier, Upload, VersaAppBuilder, VersaConfig,
    VersaError,
};

fn zip_bytes(files: &[&str]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for name in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"pixels").unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn cats_and_dogs() -> Upload<'static> {
    Upload::from_bytes(
        "cats.zip",
        zip_bytes(&["cat/cat1.png", "cat/cat2.png", "dog/dog1.png"]),
    )
}

fn config(data_dir: &Path) -> VersaConfig {
    VersaConfig {
        data_dir: data_dir.to_string_lossy().to_string(),
        ..Default::default()
    }
}

fn service_with(
    data_dir: &Path,
    classifier: StubClassifier,
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn Storage>,
) -> LifecycleService<StubClassifier> {
    VersaAppBuilder::new(config(data_dir))
        .classifier(classifier)
        .record_store(store)
        .storage(storage)
        .id_generator(Arc::new(SequentialIds::new()))
        .build()
        .unwrap()
}

fn service(data_dir: &Path) -> LifecycleService<StubClassifier> {
    service_with(
        data_dir,
        StubClassifier::new(),
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(LocalStorage::new(data_dir)),
    )
}

/// Service that keys uploads by their client file name alone
fn by_name_service(data_dir: &Path) -> LifecycleService<StubClassifier> {
    VersaAppBuilder::new(VersaConfig {
        key_uploads_by_id: false,
        ..config(data_dir)
    })
    .classifier(StubClassifier::new())
    .record_store(Arc::new(InMemoryRecordStore::new()))
    .storage(Arc::new(LocalStorage::new(data_dir)))
    .id_generator(Arc::new(SequentialIds::new()))
    .build()
    .unwrap()
}

fn artifact_dir(data_dir: &Path, id: ModelVersionId) -> PathBuf {
    data_dir.join(id.artifact_key())
}

fn staged_dir(data_dir: &Path, id: ModelVersionId) -> PathBuf {
    data_dir.join(".staging").join(id.artifact_key())
}

fn nth_id(n: u64) -> ModelVersionId {
    ModelVersionId::from_uuid(SequentialIds::nth(n))
}

#[tokio::test]
async fn test_train_registers_exactly_one_version() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());

    let receipt = service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();

    let versions = service.list_model_versions().await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, "cats-v1");
    assert_eq!(versions[0].id, receipt.model_version_id);
    assert_eq!(receipt.status, "ok");
}

#[tokio::test]
async fn test_generated_id_names_record_and_artifact() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());

    let receipt = service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();

    assert_eq!(receipt.model_version_id, nth_id(1));
    assert!(artifact_dir(data.path(), nth_id(1)).join("stub-model.json").exists());
    assert!(!staged_dir(data.path(), nth_id(1)).exists());

    let operations = service
        .ledger()
        .list_operations(&receipt.model_version_id)
        .await
        .unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].kind, OperationKind::Train);
}

#[tokio::test]
async fn test_training_twice_keeps_first_record() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());

    let first = service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();
    let second = service
        .submit_training(
            "cats-v1",
            Upload::from_bytes("birds.zip", zip_bytes(&["bird/b.png", "fish/f.png"])),
        )
        .await
        .unwrap();

    assert_eq!(second.model_version_id, first.model_version_id);
    assert_eq!(service.list_model_versions().await.unwrap().len(), 1);

    let class_map = service
        .registry()
        .get_class_index_map(&first.model_version_id)
        .await
        .unwrap();
    assert_eq!(class_map, ClassIndexMap::from_labels(["cat", "dog"]).unwrap());

    // The second run's artifact is discarded, its Train operation is kept
    assert!(!artifact_dir(data.path(), nth_id(2)).exists());
    assert!(!staged_dir(data.path(), nth_id(2)).exists());
    let operations = service
        .ledger()
        .list_operations(&first.model_version_id)
        .await
        .unwrap();
    assert_eq!(operations.len(), 2);
}

#[tokio::test]
async fn test_cats_scenario_predicts_label() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());

    let receipt = service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();
    let class_map = service
        .registry()
        .get_class_index_map(&receipt.model_version_id)
        .await
        .unwrap();
    assert_eq!(class_map.index_of("cat"), Some(0));
    assert_eq!(class_map.index_of("dog"), Some(1));

    let report = service
        .submit_prediction("cats-v1", Upload::from_bytes("my_cat.png", b"img".to_vec()))
        .await
        .unwrap();
    assert_eq!(report.label, "cat");

    let history = service.list_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, OperationKind::Predict);
    assert_eq!(history[0].model_version_id, receipt.model_version_id);
    assert!(history[0].input_ref.ends_with("_my_cat.png"));
    assert_eq!(
        history[0].output,
        HistoryOutput::Prediction {
            label: "cat".to_string()
        }
    );
}

#[tokio::test]
async fn test_evaluate_records_outcome() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());
    service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();

    let report = service
        .submit_evaluation(
            "cats-v1",
            Upload::from_bytes(
                "eval.zip",
                zip_bytes(&["holdout/cat/cat9.png", "holdout/dog/puppy.png"]),
            ),
        )
        .await
        .unwrap();

    // "puppy.png" matches no label and decodes to index 0 ("cat")
    assert_eq!(report.accuracy, 0.5);
    assert_eq!(report.loss, 0.5);

    let history = service.list_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].output,
        HistoryOutput::Evaluation {
            loss: 0.5,
            accuracy: 0.5
        }
    );
}

#[tokio::test]
async fn test_history_lists_evaluations_before_predictions() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());
    service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();

    service
        .submit_prediction("cats-v1", Upload::from_bytes("dog.png", b"x".to_vec()))
        .await
        .unwrap();
    service
        .submit_evaluation("cats-v1", cats_and_dogs())
        .await
        .unwrap();

    let kinds: Vec<_> = service
        .list_history()
        .await
        .unwrap()
        .iter()
        .map(|h: &HistoryEntry| h.kind)
        .collect();
    assert_eq!(kinds, vec![OperationKind::Evaluate, OperationKind::Predict]);
}

#[tokio::test]
async fn test_missing_version_writes_nothing() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());
    service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();
    let entries_before = std::fs::read_dir(data.path()).unwrap().count();

    let result = service
        .submit_evaluation("missing-version", cats_and_dogs())
        .await;
    assert!(matches!(result, Err(VersaError::VersionNotFound(ref v)) if v == "missing-version"));

    let result = service
        .submit_prediction("missing-version", Upload::from_bytes("cat.png", b"x".to_vec()))
        .await;
    assert!(matches!(result, Err(VersaError::VersionNotFound(_))));

    assert!(service.list_history().await.unwrap().is_empty());
    assert_eq!(std::fs::read_dir(data.path()).unwrap().count(), entries_before);
}

#[tokio::test]
async fn test_empty_version_is_rejected() {
    let data = tempfile::tempdir().unwrap();
    let result = service(data.path())
        .submit_training("", cats_and_dogs())
        .await;
    assert!(matches!(result, Err(VersaError::InvalidInput(_))));
}

#[tokio::test]
async fn test_malformed_archive_aborts_before_records() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());

    let result = service
        .submit_training("cats-v1", Upload::from_bytes("cats.zip", b"not a zip".to_vec()))
        .await;

    assert!(matches!(result, Err(VersaError::Extraction(_))));
    assert!(service.list_model_versions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_training_failure_records_nothing() {
    let data = tempfile::tempdir().unwrap();
    let service = service_with(
        data.path(),
        StubClassifier::new().failing_training(),
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(LocalStorage::new(data.path())),
    );

    let result = service.submit_training("cats-v1", cats_and_dogs()).await;

    assert!(matches!(result, Err(VersaError::Training(_))));
    assert!(service.list_model_versions().await.unwrap().is_empty());
    assert!(!staged_dir(data.path(), nth_id(1)).exists());
}

#[tokio::test]
async fn test_inference_failure_records_nothing() {
    let data = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(data.path()));

    service_with(data.path(), StubClassifier::new(), store.clone(), storage.clone())
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();

    let failing = service_with(
        data.path(),
        StubClassifier::new().failing_inference(),
        store.clone(),
        storage,
    );
    let result = failing
        .submit_prediction("cats-v1", Upload::from_bytes("cat.png", b"x".to_vec()))
        .await;

    assert!(matches!(result, Err(VersaError::Inference(_))));
    assert!(failing.list_history().await.unwrap().is_empty());
    let operations = store.list_operations(&nth_id(1)).await.unwrap();
    assert_eq!(operations.len(), 1);
}

#[tokio::test]
async fn test_save_failure_records_nothing() {
    let data = tempfile::tempdir().unwrap();
    let service = service_with(
        data.path(),
        StubClassifier::new().failing_save(),
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(LocalStorage::new(data.path())),
    );

    let result = service.submit_training("cats-v1", cats_and_dogs()).await;

    assert!(matches!(result, Err(VersaError::Persistence(_))));
    assert!(service.list_model_versions().await.unwrap().is_empty());
    assert!(!staged_dir(data.path(), nth_id(1)).exists());
    assert!(!artifact_dir(data.path(), nth_id(1)).exists());
}

#[tokio::test]
async fn test_upload_named_after_model_keeps_artifact() {
    let data = tempfile::tempdir().unwrap();
    let service = by_name_service(data.path());

    let cats = service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();
    let artifact = artifact_dir(data.path(), cats.model_version_id);
    assert!(artifact.join("stub-model.json").exists());

    service
        .submit_training(
            "other-v1",
            Upload::from_bytes(
                format!("{}.zip", cats.model_version_id.artifact_key()),
                zip_bytes(&["bird/b.png", "fish/f.png"]),
            ),
        )
        .await
        .unwrap();

    assert!(artifact.join("stub-model.json").exists());
    assert_eq!(service.list_model_versions().await.unwrap().len(), 2);
    let report = service
        .submit_prediction("cats-v1", Upload::from_bytes("my_cat.png", b"img".to_vec()))
        .await
        .unwrap();
    assert_eq!(report.label, "cat");
}

#[tokio::test]
async fn test_hidden_upload_name_is_rejected() {
    let data = tempfile::tempdir().unwrap();
    let service = by_name_service(data.path());
    let staging = data.path().join(".staging");
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("keep"), b"x").unwrap();

    let result = service
        .submit_training(
            "cats-v1",
            Upload::from_bytes(".staging.zip", zip_bytes(&["cat/c.png", "dog/d.png"])),
        )
        .await;

    assert!(matches!(result, Err(VersaError::InvalidInput(_))));
    assert!(staging.join("keep").exists());
    assert!(service.list_model_versions().await.unwrap().is_empty());
}

/// Record store whose transactions roll back instead of committing
struct FailingCommitStore {
    inner: InMemoryRecordStore,
}

struct FailingCommitTransaction {
    inner: Box<dyn RecordTransaction>,
}

#[async_trait]
impl RecordStore for FailingCommitStore {
    async fn begin(&self) -> versa::record::Result<Box<dyn RecordTransaction>> {
        Ok(Box::new(FailingCommitTransaction {
            inner: self.inner.begin().await?,
        }))
    }

    async fn model_version_by_name(
        &self,
        version: &str,
    ) -> versa::record::Result<Option<ModelVersion>> {
        self.inner.model_version_by_name(version).await
    }

    async fn model_version_by_id(
        &self,
        id: &ModelVersionId,
    ) -> versa::record::Result<Option<ModelVersion>> {
        self.inner.model_version_by_id(id).await
    }

    async fn list_model_versions(&self) -> versa::record::Result<Vec<ModelVersion>> {
        self.inner.list_model_versions().await
    }

    async fn list_operations(
        &self,
        model_version_id: &ModelVersionId,
    ) -> versa::record::Result<Vec<Operation>> {
        self.inner.list_operations(model_version_id).await
    }

    async fn list_history(&self) -> versa::record::Result<Vec<HistoryEntry>> {
        self.inner.list_history().await
    }
}

#[async_trait]
impl RecordTransaction for FailingCommitTransaction {
    async fn create_or_get_model_version(
        &mut self,
        candidate: ModelVersion,
    ) -> versa::record::Result<ModelVersion> {
        self.inner.create_or_get_model_version(candidate).await
    }

    async fn insert_operation(&mut self, operation: Operation) -> versa::record::Result<Operation> {
        self.inner.insert_operation(operation).await
    }

    async fn insert_evaluate_outcome(
        &mut self,
        outcome: EvaluateOutcome,
    ) -> versa::record::Result<EvaluateOutcome> {
        self.inner.insert_evaluate_outcome(outcome).await
    }

    async fn insert_predict_outcome(
        &mut self,
        outcome: PredictOutcome,
    ) -> versa::record::Result<PredictOutcome> {
        self.inner.insert_predict_outcome(outcome).await
    }

    async fn commit(self: Box<Self>) -> versa::record::Result<()> {
        self.inner.rollback().await?;
        Err(RecordError::Database("commit refused".to_string()))
    }

    async fn rollback(self: Box<Self>) -> versa::record::Result<()> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn test_commit_failure_leaves_no_artifact() {
    let data = tempfile::tempdir().unwrap();
    let service = service_with(
        data.path(),
        StubClassifier::new(),
        Arc::new(FailingCommitStore {
            inner: InMemoryRecordStore::new(),
        }),
        Arc::new(LocalStorage::new(data.path())),
    );

    let result = service.submit_training("cats-v1", cats_and_dogs()).await;

    assert!(matches!(result, Err(VersaError::Record(_))));
    assert!(service.list_model_versions().await.unwrap().is_empty());
    assert!(!artifact_dir(data.path(), nth_id(1)).exists());
    assert!(!staged_dir(data.path(), nth_id(1)).exists());
}

/// Local storage whose renames always fail
struct NoRenameStorage {
    inner: LocalStorage,
}

#[async_trait]
impl Storage for NoRenameStorage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.inner.read(key).await
    }

    async fn write_stream(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        chunk_size: usize,
    ) -> StorageResult<u64> {
        self.inner.write_stream(key, reader, chunk_size).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn rename(&self, _source: &str, _destination: &str) -> StorageResult<()> {
        Err(StorageError::Other("rename disabled".to_string()))
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        self.inner.resolve(key)
    }
}

#[tokio::test]
async fn test_failed_promotion_keeps_record_and_staged_artifact() {
    let data = tempfile::tempdir().unwrap();
    let service = service_with(
        data.path(),
        StubClassifier::new(),
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(NoRenameStorage {
            inner: LocalStorage::new(data.path()),
        }),
    );

    let result = service.submit_training("cats-v1", cats_and_dogs()).await;

    assert!(matches!(result, Err(VersaError::Storage(_))));
    assert_eq!(service.list_model_versions().await.unwrap().len(), 1);
    assert!(staged_dir(data.path(), nth_id(1)).exists());
    assert!(!artifact_dir(data.path(), nth_id(1)).exists());
}

#[tokio::test]
async fn test_concurrent_first_trainings_converge() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());

    let (a, b) = tokio::join!(
        service.submit_training("cats-v1", cats_and_dogs()),
        service.submit_training("cats-v1", cats_and_dogs()),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.model_version_id, b.model_version_id);
    assert_eq!(service.list_model_versions().await.unwrap().len(), 1);
    assert!(artifact_dir(data.path(), a.model_version_id).exists());
}

#[tokio::test]
async fn test_same_name_uploads_without_ids_are_last_writer_wins() {
    let data = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(data.path()));
    let first = vec![b'a'; 64 * 1024];
    let second = vec![b'b'; 64 * 1024];

    let mut first_reader = first.as_slice();
    let mut second_reader = second.as_slice();
    let (r1, r2) = tokio::join!(
        storage.write_stream("cat.png", &mut first_reader, 1024),
        storage.write_stream("cat.png", &mut second_reader, 1024),
    );
    r1.unwrap();
    r2.unwrap();

    let stored = storage.read("cat.png").await.unwrap();
    assert_eq!(stored.len(), first.len());
    assert!(stored == first || stored == second);
}

#[tokio::test]
async fn test_same_name_uploads_get_distinct_keys() {
    let data = tempfile::tempdir().unwrap();
    let service = service(data.path());
    service
        .submit_training("cats-v1", cats_and_dogs())
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        service.submit_prediction("cats-v1", Upload::from_bytes("cat.png", b"1".to_vec())),
        service.submit_prediction("cats-v1", Upload::from_bytes("cat.png", b"2".to_vec())),
    );
    a.unwrap();
    b.unwrap();

    let history = service.list_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_ne!(history[0].input_ref, history[1].input_ref);
}
