use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use super::{RecordError, RecordStore, RecordTransaction, Result};
use crate::ledger::{
    EvaluateOutcome, HistoryEntry, HistoryOutput, Operation, OperationId, OperationKind,
    PredictOutcome,
};
use crate::model_version::{ModelVersion, ModelVersionId};
use versa_core::ClassIndexMap;

fn database_error(e: sqlx::Error) -> RecordError {
    RecordError::Database(e.to_string())
}

fn model_version_from_row(row: &PgRow) -> Result<ModelVersion> {
    let id: Uuid = row.get("id");
    let class_map: String = row.get("class_map");
    let class_map = ClassIndexMap::from_json(&class_map).map_err(|e| {
        RecordError::InvalidData(format!("Invalid class map for model {}: {}", id, e))
    })?;
    let created_at: DateTime<Utc> = row.get("created_at");

    Ok(ModelVersion {
        id: ModelVersionId::from_uuid(id),
        version: row.get("version"),
        class_map,
        created_at,
    })
}

fn operation_kind(value: &str) -> Result<OperationKind> {
    OperationKind::from_str(value)
        .map_err(|_| RecordError::InvalidData(format!("Invalid operation kind: {}", value)))
}

fn operation_from_row(row: &PgRow) -> Result<Operation> {
    let kind: String = row.get("kind");
    Ok(Operation {
        id: OperationId::from_uuid(row.get("id")),
        kind: operation_kind(&kind)?,
        time: row.get("time"),
        model_version_id: ModelVersionId::from_uuid(row.get("model_version_id")),
    })
}

fn history_from_row(row: &PgRow, output: HistoryOutput) -> Result<HistoryEntry> {
    let kind: String = row.get("kind");
    Ok(HistoryEntry {
        kind: operation_kind(&kind)?,
        time: row.get("time"),
        model_version_id: ModelVersionId::from_uuid(row.get("model_version_id")),
        input_ref: row.get("input_ref"),
        output,
    })
}

/// PostgreSQL implementation of RecordStore
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Create a new PostgresRecordStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RecordError::Database(format!("Migration failed: {}", e)))
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn begin(&self) -> Result<Box<dyn RecordTransaction>> {
        let tx = self.pool.begin().await.map_err(database_error)?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn model_version_by_name(&self, version: &str) -> Result<Option<ModelVersion>> {
        let row = sqlx::query(
            r#"
            SELECT id, version, class_map, created_at
            FROM model_versions
            WHERE version = $1
            "#,
        )
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.as_ref().map(model_version_from_row).transpose()
    }

    async fn model_version_by_id(&self, id: &ModelVersionId) -> Result<Option<ModelVersion>> {
        let row = sqlx::query(
            r#"
            SELECT id, version, class_map, created_at
            FROM model_versions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.as_ref().map(model_version_from_row).transpose()
    }

    async fn list_model_versions(&self) -> Result<Vec<ModelVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT id, version, class_map, created_at
            FROM model_versions
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter().map(model_version_from_row).collect()
    }

    async fn list_operations(&self, model_version_id: &ModelVersionId) -> Result<Vec<Operation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, time, model_version_id
            FROM operations
            WHERE model_version_id = $1
            ORDER BY seq
            "#,
        )
        .bind(model_version_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        rows.iter().map(operation_from_row).collect()
    }

    async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let evaluations = sqlx::query(
            r#"
            SELECT o.kind, o.time, o.model_version_id, e.input_ref, e.loss, e.accuracy
            FROM evaluate_outcomes e
            JOIN operations o ON o.id = e.operation_id
            ORDER BY e.seq
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        let predictions = sqlx::query(
            r#"
            SELECT o.kind, o.time, o.model_version_id, p.input_ref, p.label
            FROM predict_outcomes p
            JOIN operations o ON o.id = p.operation_id
            ORDER BY p.seq
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        let mut history = Vec::with_capacity(evaluations.len() + predictions.len());
        for row in &evaluations {
            let output = HistoryOutput::Evaluation {
                loss: row.get("loss"),
                accuracy: row.get("accuracy"),
            };
            history.push(history_from_row(row, output)?);
        }
        for row in &predictions {
            let output = HistoryOutput::Prediction {
                label: row.get("label"),
            };
            history.push(history_from_row(row, output)?);
        }
        Ok(history)
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    /// Lock the target operation row and check it can take an outcome of `expected` kind
    async fn check_outcome_target(
        &mut self,
        operation_id: &OperationId,
        expected: OperationKind,
    ) -> Result<()> {
        let row = sqlx::query("SELECT kind FROM operations WHERE id = $1 FOR UPDATE")
            .bind(operation_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database_error)?;

        let kind: String = row
            .ok_or_else(|| RecordError::Referential(format!("operation {}", operation_id)))?
            .get("kind");
        let actual = operation_kind(&kind)?;
        if actual != expected {
            return Err(RecordError::OutcomeKindMismatch {
                operation: operation_id.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

fn outcome_insert_error(e: sqlx::Error, operation_id: &OperationId) -> RecordError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RecordError::DuplicateOutcome(operation_id.to_string())
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            RecordError::Referential(format!("operation {}", operation_id))
        }
        _ => database_error(e),
    }
}

#[async_trait]
impl RecordTransaction for PostgresTransaction {
    async fn create_or_get_model_version(
        &mut self,
        candidate: ModelVersion,
    ) -> Result<ModelVersion> {
        let class_map = candidate
            .class_map
            .to_json()
            .map_err(|e| RecordError::InvalidData(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO model_versions (id, version, class_map, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (version) DO NOTHING
            "#,
        )
        .bind(candidate.id.as_uuid())
        .bind(&candidate.version)
        .bind(class_map)
        .bind(candidate.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RecordError::InvalidData(format!(
                    "model version id {} is already taken",
                    candidate.id
                ))
            }
            _ => database_error(e),
        })?;

        let row = sqlx::query(
            r#"
            SELECT id, version, class_map, created_at
            FROM model_versions
            WHERE version = $1
            "#,
        )
        .bind(&candidate.version)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(database_error)?;

        model_version_from_row(&row)
    }

    async fn insert_operation(&mut self, operation: Operation) -> Result<Operation> {
        sqlx::query(
            r#"
            INSERT INTO operations (id, kind, time, model_version_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(operation.id.as_uuid())
        .bind(operation.kind.to_string())
        .bind(operation.time)
        .bind(operation.model_version_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                RecordError::Referential(format!("model version {}", operation.model_version_id))
            }
            _ => database_error(e),
        })?;

        Ok(operation)
    }

    async fn insert_evaluate_outcome(
        &mut self,
        outcome: EvaluateOutcome,
    ) -> Result<EvaluateOutcome> {
        self.check_outcome_target(&outcome.operation_id, OperationKind::Evaluate)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO evaluate_outcomes (id, operation_id, input_ref, loss, accuracy)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(outcome.id)
        .bind(outcome.operation_id.as_uuid())
        .bind(&outcome.input_ref)
        .bind(outcome.loss)
        .bind(outcome.accuracy)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| outcome_insert_error(e, &outcome.operation_id))?;

        Ok(outcome)
    }

    async fn insert_predict_outcome(&mut self, outcome: PredictOutcome) -> Result<PredictOutcome> {
        self.check_outcome_target(&outcome.operation_id, OperationKind::Predict)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO predict_outcomes (id, operation_id, input_ref, label)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(outcome.id)
        .bind(outcome.operation_id.as_uuid())
        .bind(&outcome.input_ref)
        .bind(&outcome.label)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| outcome_insert_error(e, &outcome.operation_id))?;

        Ok(outcome)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(database_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(database_error)
    }
}
