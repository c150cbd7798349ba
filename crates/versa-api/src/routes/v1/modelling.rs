//! Upload endpoints: train, evaluate and predict
//!
//! File parts are streamed into the artifact store as they arrive; nothing is
//! buffered in memory beyond one chunk.

use axum::{
    Json, Router,
    extract::{Multipart, Query, State, multipart::Field},
    http::StatusCode,
    routing::post,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;
use crate::error::{ApiError, ErrorResponse, api_error, from_versa};
use versa::Upload;

pub const TRAINING_FIELD: &str = "training-file";
pub const EVALUATION_FIELD: &str = "evaluation-file";
pub const TEST_FIELD: &str = "test-file";

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VersionQuery {
    /// Model version name
    pub model_version: String,
}

/// Multipart body carrying one file part
#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadForm {
    /// Zip archive (train, evaluate) or image (predict), sent as
    /// `training-file`, `evaluation-file` or `test-file`
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrainResponse {
    pub message: String,
    pub model_version_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EvaluateResponse {
    pub accuracy: f64,
    pub loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PredictResponse {
    pub prediction: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/train", post(train))
        .route("/evaluate", post(evaluate))
        .route("/predict", post(predict))
}

fn missing_field(name: &str) -> ApiError {
    api_error(
        StatusCode::BAD_REQUEST,
        format!("multipart field '{}' is required", name),
    )
}

fn malformed(e: impl std::fmt::Display) -> ApiError {
    api_error(
        StatusCode::BAD_REQUEST,
        format!("malformed multipart body: {}", e),
    )
}

/// Stream a file part without buffering it
fn into_upload(field: Field<'_>) -> Upload<'_> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let body = Box::pin(field.map_err(std::io::Error::other));
    Upload::new(file_name, StreamReader::new(body))
}

/// Train a model from a zipped dataset
#[utoipa::path(
    post,
    path = "/api/v1/train",
    params(VersionQuery),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Model trained and registered", body = TrainResponse),
        (status = 400, description = "Missing file or malformed archive", body = ErrorResponse),
        (status = 500, description = "Training failed", body = ErrorResponse)
    ),
    tag = "modelling"
)]
pub async fn train(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
    mut multipart: Multipart,
) -> Result<Json<TrainResponse>, ApiError> {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(TRAINING_FIELD) => break field,
            Ok(Some(_)) => continue,
            Ok(None) => return Err(missing_field(TRAINING_FIELD)),
            Err(e) => return Err(malformed(e)),
        }
    };

    let receipt = state
        .lifecycle
        .submit_training(&query.model_version, into_upload(field))
        .await
        .map_err(from_versa)?;

    tracing::info!(
        model_version = %query.model_version,
        model_version_id = %receipt.model_version_id,
        "training request completed"
    );
    Ok(Json(TrainResponse {
        message: "Training Successful".to_string(),
        model_version_id: receipt.model_version_id.to_string(),
    }))
}

/// Evaluate a registered model on a zipped dataset
#[utoipa::path(
    post,
    path = "/api/v1/evaluate",
    params(VersionQuery),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Evaluation result", body = EvaluateResponse),
        (status = 400, description = "Missing file or malformed archive", body = ErrorResponse),
        (status = 422, description = "Unknown model version", body = ErrorResponse),
        (status = 500, description = "Evaluation failed", body = ErrorResponse)
    ),
    tag = "modelling"
)]
pub async fn evaluate(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
    mut multipart: Multipart,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(EVALUATION_FIELD) => break field,
            Ok(Some(_)) => continue,
            Ok(None) => return Err(missing_field(EVALUATION_FIELD)),
            Err(e) => return Err(malformed(e)),
        }
    };

    let report = state
        .lifecycle
        .submit_evaluation(&query.model_version, into_upload(field))
        .await
        .map_err(from_versa)?;

    tracing::info!(
        model_version = %query.model_version,
        accuracy = report.accuracy,
        "evaluation request completed"
    );
    Ok(Json(EvaluateResponse {
        accuracy: report.accuracy,
        loss: report.loss,
    }))
}

/// Classify one image with a registered model
#[utoipa::path(
    post,
    path = "/api/v1/predict",
    params(VersionQuery),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Predicted label", body = PredictResponse),
        (status = 400, description = "Missing file", body = ErrorResponse),
        (status = 422, description = "Unknown model version", body = ErrorResponse),
        (status = 500, description = "Prediction failed", body = ErrorResponse)
    ),
    tag = "modelling"
)]
pub async fn predict(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(TEST_FIELD) => break field,
            Ok(Some(_)) => continue,
            Ok(None) => return Err(missing_field(TEST_FIELD)),
            Err(e) => return Err(malformed(e)),
        }
    };

    let report = state
        .lifecycle
        .submit_prediction(&query.model_version, into_upload(field))
        .await
        .map_err(from_versa)?;

    tracing::info!(
        model_version = %query.model_version,
        label = %report.label,
        "prediction request completed"
    );
    Ok(Json(PredictResponse {
        prediction: report.label,
    }))
}
