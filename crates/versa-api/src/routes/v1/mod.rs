use crate::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;

pub mod modelling;
pub mod status;

/// API v1 routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(modelling::routes().layer(DefaultBodyLimit::disable()))
        .merge(status::routes())
}
