use crate::AppState;
use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness answer, naming the classifier backend the lifecycle runs on
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub classifier: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Lifecycle service is accepting train, evaluate and predict requests", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        classifier: state.lifecycle.classifier_metadata().name,
    })
}
