use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the run log database is reachable (`false` when disabled).
    pub run_log_healthy: bool,
}

/// GET /health -- returns service and run log health.
///
/// A disabled run log is not a degradation; an unreachable one is.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let run_log = state.runner.run_log();
    let run_log_healthy = run_log.is_healthy().await;

    let status = if run_log_healthy || !run_log.is_enabled() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        run_log_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
