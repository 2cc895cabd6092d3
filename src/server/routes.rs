//! Router configuration for the queue server.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Provider callback
        .route("/webhooks/phantombuster", post(handlers::receive_webhook))
        // Queue surface
        .route("/api/queue/status", get(handlers::queue_status))
        .route(
            "/api/queue/jobs",
            get(handlers::list_queue_jobs).post(handlers::enqueue_job),
        )
        .route("/api/queue/jobs/:job_id", delete(handlers::remove_queue_job))
        .route("/api/queue/advance", post(handlers::advance_queue))
        // Audit surface
        .route("/api/jobs", get(handlers::list_jobs))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
