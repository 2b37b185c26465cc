//! Liveness endpoint.

use axum::extract::State;
use axum::http::StatusCode;

use super::AppState;

/// 200 `OK` while signals are accepted. Turns 503 once shutdown begins, so
/// load balancers drain the instance while running deploys finish.
pub async fn health_handler(State(app_state): State<AppState>) -> (StatusCode, &'static str) {
    if app_state.signals().is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    } else {
        (StatusCode::OK, "OK")
    }
}
