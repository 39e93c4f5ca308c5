//! Liveness and storage readiness probe.

use axum::extract::State;
use serde::Serialize;
use tracing::warn;

use crate::api::envelope::ApiResponse;
use crate::api::error::ApiError;
use crate::api::routes::ApiState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub storage: &'static str,
}

/// Returns 200 when the server is up and storage answers, 503 otherwise.
pub async fn ping_handler(
    State(state): State<ApiState>,
) -> Result<ApiResponse<HealthResponse>, ApiError> {
    if let Err(err) = state.accounts.ping().await {
        warn!(error = %err, "storage ping failed");
        return Err(ApiError::service_unavailable("Storage unavailable"));
    }
    Ok(ApiResponse::ok("pong", HealthResponse { storage: "ok" }))
}
