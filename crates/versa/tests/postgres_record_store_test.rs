use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use uuid::Uuid;

use versa::ledger::{EvaluateOutcome, Operation, PredictOutcome};
use versa::record::{PostgresRecordStore, RecordError, RecordStore};
use versa::{ClassIndexMap, ModelVersion, ModelVersionId, OperationKind};

/// Connects to `DATABASE_URL`; `None` skips the test
async fn setup_test_db() -> Option<PgPool> {
    dotenv::dotenv().ok();

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    PostgresRecordStore::new(pool.clone())
        .migrate()
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

fn test_model(prefix: &str) -> ModelVersion {
    ModelVersion::new(
        ModelVersionId::new(),
        format!("test_{}_{}", prefix, Uuid::new_v4()),
        ClassIndexMap::from_labels(["cat", "dog"]).unwrap(),
    )
}

#[tokio::test]
async fn test_create_or_get_is_idempotent() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = PostgresRecordStore::new(pool);
    let model = test_model("idempotent");

    let mut tx = store.begin().await.unwrap();
    let created = tx.create_or_get_model_version(model.clone()).await.unwrap();
    tx.commit().await.unwrap();

    let mut other = model.clone();
    other.id = ModelVersionId::new();
    other.class_map = ClassIndexMap::from_labels(["bird"]).unwrap();

    let mut tx = store.begin().await.unwrap();
    let hit = tx.create_or_get_model_version(other).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(created.id, model.id);
    assert_eq!(hit.id, model.id);
    assert_eq!(hit.class_map, model.class_map);

    let fetched = store
        .model_version_by_name(&model.version)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.id, model.id);
}

#[tokio::test]
async fn test_concurrent_create_or_get_converges() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = Arc::new(PostgresRecordStore::new(pool));
    let model = test_model("race");

    let attempt = |candidate: ModelVersion| {
        let store = store.clone();
        async move {
            let mut tx = store.begin().await.unwrap();
            let record = tx.create_or_get_model_version(candidate).await.unwrap();
            tx.commit().await.unwrap();
            record
        }
    };

    let mut second = model.clone();
    second.id = ModelVersionId::new();
    let (a, b) = tokio::join!(attempt(model.clone()), attempt(second));

    assert_eq!(a.id, b.id);
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = PostgresRecordStore::new(pool);
    let model = test_model("rollback");

    let mut tx = store.begin().await.unwrap();
    tx.create_or_get_model_version(model.clone()).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(store.model_version_by_id(&model.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_ledger_constraints() {
    let Some(pool) = setup_test_db().await else {
        return;
    };
    let store = PostgresRecordStore::new(pool);
    let model = test_model("ledger");

    let mut tx = store.begin().await.unwrap();
    let dangling = tx
        .insert_operation(Operation::new(OperationKind::Train, ModelVersionId::new()))
        .await;
    assert!(matches!(dangling, Err(RecordError::Referential(_))));
    tx.rollback().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.create_or_get_model_version(model.clone()).await.unwrap();
    let predict = tx
        .insert_operation(Operation::new(OperationKind::Predict, model.id))
        .await
        .unwrap();

    let mismatch = tx
        .insert_evaluate_outcome(EvaluateOutcome {
            id: Uuid::new_v4(),
            operation_id: predict.id,
            input_ref: "eval.zip".to_string(),
            loss: 0.1,
            accuracy: 0.9,
        })
        .await;
    assert!(matches!(mismatch, Err(RecordError::OutcomeKindMismatch { .. })));

    let outcome = PredictOutcome {
        id: Uuid::new_v4(),
        operation_id: predict.id,
        input_ref: "cat.png".to_string(),
        label: "cat".to_string(),
    };
    tx.insert_predict_outcome(outcome.clone()).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let duplicate = tx
        .insert_predict_outcome(PredictOutcome {
            id: Uuid::new_v4(),
            ..outcome
        })
        .await;
    assert!(matches!(duplicate, Err(RecordError::DuplicateOutcome(_))));
    tx.rollback().await.unwrap();

    let operations = store.list_operations(&model.id).await.unwrap();
    assert_eq!(operations.len(), 1);
    let history = store.list_history().await.unwrap();
    assert!(history.iter().any(|h| h.input_ref == "cat.png"
        && h.model_version_id == model.id
        && h.kind == OperationKind::Predict));
}
