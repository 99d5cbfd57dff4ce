use axum::Router;

pub mod analysis;
pub mod metrics;
pub mod system;

/// Routes that need application services.
pub fn router() -> Router {
    Router::new()
        .nest("/records", analysis::router())
        .nest("/metrics", metrics::router())
}
