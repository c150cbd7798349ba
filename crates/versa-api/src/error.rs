use axum::Json;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use versa::VersaError;

/// Error body returned by every failing request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

pub fn status_of(error: &VersaError) -> StatusCode {
    match error {
        VersaError::VersionNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VersaError::NotFound(_) => StatusCode::NOT_FOUND,
        VersaError::Extraction(_) | VersaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        VersaError::Upload(_)
        | VersaError::Training(_)
        | VersaError::Inference(_)
        | VersaError::Persistence(_)
        | VersaError::Referential(_)
        | VersaError::DuplicateOutcome(_)
        | VersaError::OutcomeKindMismatch(_)
        | VersaError::Storage(_)
        | VersaError::Record(_)
        | VersaError::InvalidTransition(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<VersaError> for ErrorResponse {
    fn from(error: VersaError) -> Self {
        Self {
            detail: error.to_string(),
        }
    }
}

/// Map a lifecycle error to its response, logging server-side failures
pub fn from_versa(error: VersaError) -> ApiError {
    let status = status_of(&error);
    if error.is_client_error() {
        tracing::debug!(error = %error, status = %status, "request rejected");
    } else {
        tracing::error!(error = %error, "request failed");
    }
    (status, Json(ErrorResponse::from(error)))
}
