use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::errors::json_error;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", get(snapshot))
}

/// Current aggregate. All zeros before the first analysis.
async fn snapshot(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.metrics_snapshot().await {
        Ok(aggregate) => Json(aggregate).into_response(),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}
