use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;
use crate::error::{ApiError, ErrorResponse, from_versa};
use versa::{HistoryEntry, HistoryOutput, ModelVersionSummary};

/// API representation of a registered model version
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelVersionDto {
    pub id: String,
    pub version: String,
    pub created_at: String,
}

impl From<ModelVersionSummary> for ModelVersionDto {
    fn from(summary: ModelVersionSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            version: summary.version,
            created_at: summary.created_at.to_rfc3339(),
        }
    }
}

/// Result of an evaluate or predict operation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum HistoryOutputDto {
    Evaluation { loss: f64, accuracy: f64 },
    Prediction { label: String },
}

impl From<HistoryOutput> for HistoryOutputDto {
    fn from(output: HistoryOutput) -> Self {
        match output {
            HistoryOutput::Evaluation { loss, accuracy } => Self::Evaluation { loss, accuracy },
            HistoryOutput::Prediction { label } => Self::Prediction { label },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryDto {
    /// `evaluate` or `predict`
    pub kind: String,
    pub time: String,
    pub model_version_id: String,
    pub input_ref: String,
    pub output: HistoryOutputDto,
}

impl From<HistoryEntry> for HistoryEntryDto {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            kind: entry.kind.to_string(),
            time: entry.time.to_rfc3339(),
            model_version_id: entry.model_version_id.to_string(),
            input_ref: entry.input_ref,
            output: HistoryOutputDto::from(entry.output),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/metadata", get(metadata))
        .route("/history", get(history))
}

/// List registered model versions
#[utoipa::path(
    get,
    path = "/api/v1/metadata",
    responses(
        (status = 200, description = "Registered model versions, oldest first", body = [ModelVersionDto]),
        (status = 500, description = "Record store failure", body = ErrorResponse)
    ),
    tag = "status"
)]
pub async fn metadata(
    State(state): State<AppState>,
) -> Result<Json<Vec<ModelVersionDto>>, ApiError> {
    let versions = state
        .lifecycle
        .list_model_versions()
        .await
        .map_err(from_versa)?;
    Ok(Json(versions.into_iter().map(ModelVersionDto::from).collect()))
}

/// List evaluation and prediction history
#[utoipa::path(
    get,
    path = "/api/v1/history",
    responses(
        (status = 200, description = "Evaluate and predict operations with their outcomes", body = [HistoryEntryDto]),
        (status = 500, description = "Record store failure", body = ErrorResponse)
    ),
    tag = "status"
)]
pub async fn history(
    State(state): State<AppState>,
) -> Result<Json<Vec<HistoryEntryDto>>, ApiError> {
    let entries = state.lifecycle.list_history().await.map_err(from_versa)?;
    Ok(Json(entries.into_iter().map(HistoryEntryDto::from).collect()))
}
