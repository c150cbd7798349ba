use axum::Router;
use axum::http::HeaderValue;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use versa::Lifecycle;

pub mod config;
pub mod error;
pub mod routes;

pub use config::{ApiConfig, CorsConfig};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<dyn Lifecycle>,
}

impl AppState {
    pub fn new(lifecycle: Arc<dyn Lifecycle>) -> Self {
        Self { lifecycle }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::v1::modelling::train,
        crate::routes::v1::modelling::evaluate,
        crate::routes::v1::modelling::predict,
        crate::routes::v1::status::metadata,
        crate::routes::v1::status::history,
    ),
    components(
        schemas(
            crate::routes::health::HealthResponse,
            crate::error::ErrorResponse,
            crate::routes::v1::modelling::TrainResponse,
            crate::routes::v1::modelling::EvaluateResponse,
            crate::routes::v1::modelling::PredictResponse,
            crate::routes::v1::modelling::UploadForm,
            crate::routes::v1::status::ModelVersionDto,
            crate::routes::v1::status::HistoryEntryDto,
            crate::routes::v1::status::HistoryOutputDto,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "modelling", description = "Train, evaluate and predict"),
        (name = "status", description = "Registered model versions and history")
    )
)]
pub struct ApiDoc;

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allow_any_origin {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

/// Build API application
pub fn build_app(state: AppState, config: &ApiConfig) -> Router {
    let mut router = Router::new().merge(routes::routes());
    if config.enable_swagger {
        router = router
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
        .layer(cors_layer(&config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
