use axum::{extract::State, http::StatusCode};

use crate::AppState;

/// 存活检查，返回纯文本
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, String) {
    match state.health.probe().await {
        Ok(()) => (StatusCode::OK, "OK".to_string()),
        Err(err) => {
            tracing::error!(endpoint = "healthz", error = %err, "store health check failed");
            state.telemetry.capture("healthz", &err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
