//! Axum router for the dashboard API.
//!
//! CORS is permissive: the dashboard UI is served separately during
//! development and the API is read-only apart from manual triggers.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete dashboard router with middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/jobs", get(handlers::jobs::list_jobs))
        .route("/api/jobs/{id}", get(handlers::jobs::get_job))
        .route("/api/jobs/{id}/runs", get(handlers::jobs::job_runs))
        .route("/api/jobs/{id}/trigger", post(handlers::jobs::trigger_job))
        .route("/api/events", get(handlers::events::event_stream))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /health` -- liveness plus job count and uptime.
async fn health(State(state): State<AppState>) -> axum::Json<Value> {
    axum::Json(json!({
        "status": "ok",
        "jobs": state.registry.len(),
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}
