use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiResponse, AppState};
use crate::db::format_timestamp;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub environment: &'static str,
    pub database: bool,
    pub uptime_seconds: u64,
}

/// GET /health
///
/// Reports 503 when the database does not answer.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check database ping failed");
            false
        }
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if database { "ok" } else { "degraded" },
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: format_timestamp(state.shared.clock.now()),
        environment: state.config().general.environment.as_str(),
        database,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };

    (status, Json(ApiResponse::success(body)))
}
