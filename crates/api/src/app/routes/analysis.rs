use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use sprout_core::RecordId;
use sprout_infra::{AnalysisOutcome, AnalysisResponse};

use crate::app::errors::json_error;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:id/analysis", post(run_analysis))
}

async fn run_analysis(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RecordId = match id.parse() {
        Ok(id) => id,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()),
    };

    let outcome = services.run_analysis(id).await;
    let status = outcome_status(&outcome);
    (status, Json(AnalysisResponse::from(outcome))).into_response()
}

/// Every outcome except a missing record is a completed request; the body
/// carries success or failure.
fn outcome_status(outcome: &AnalysisOutcome) -> StatusCode {
    match outcome {
        AnalysisOutcome::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    }
}
